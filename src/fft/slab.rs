use {
    super::{
        lines::{c2r_last_axis, fft_axis, normalise, r2c_last_axis},
        DimMapping, SpectralTransform, AXIS_X, AXIS_Y, AXIS_Z,
    },
    crate::{
        comm::{all_to_all, Communicator, Tag},
        decomp::block_partition,
        error::Result,
    },
    log::debug,
    ndarray::{s, Array3, ArrayView3, Axis},
    num_complex::Complex64,
    rustfft::{Fft, FftPlanner},
    std::{ops::Range, sync::Arc},
};

const TRANSPOSE_TAG: Tag = 32_000;

/// Distributed 3d transform with a slab decomposition.
///
/// Physical arrays are split along z. After the x and y transforms the data
/// is transposed across ranks so that the spectral arrays are laid out
/// (ky, kz, kx) and split along ky.
pub struct Slab3d {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    comm: Arc<dyn Communicator>,
    // Physical partition along z, indexed by rank
    z_ranges: Vec<Range<usize>>,
    // Spectral partition along ky, indexed by rank
    y_ranges: Vec<Range<usize>>,

    fft_x: Arc<dyn Fft<f64>>,
    fft_y: Arc<dyn Fft<f64>>,
    fft_z: Arc<dyn Fft<f64>>,
    ifft_x: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
    ifft_z: Arc<dyn Fft<f64>>,
}

impl Slab3d {
    pub fn new(nx: usize, ny: usize, nz: usize, comm: Arc<dyn Communicator>) -> Result<Self> {
        let z_ranges = block_partition(nz, comm.size())?;
        let y_ranges = block_partition(ny, comm.size())?;

        debug!(
            "rank {}: slab z {:?}, ky {:?}",
            comm.rank(),
            z_ranges[comm.rank()],
            y_ranges[comm.rank()]
        );

        let mut planner = FftPlanner::new();

        Ok(Self {
            nx,
            ny,
            nz,
            comm,
            z_ranges,
            y_ranges,
            fft_x: planner.plan_fft_forward(nx),
            fft_y: planner.plan_fft_forward(ny),
            fft_z: planner.plan_fft_forward(nz),
            ifft_x: planner.plan_fft_inverse(nx),
            ifft_y: planner.plan_fft_inverse(ny),
            ifft_z: planner.plan_fft_inverse(nz),
        })
    }

    fn nkx(&self) -> usize {
        self.nx / 2 + 1
    }

    fn z_range(&self) -> Range<usize> {
        self.z_ranges[self.comm.rank()].clone()
    }

    fn y_range(&self) -> Range<usize> {
        self.y_ranges[self.comm.rank()].clone()
    }
}

impl SpectralTransform for Slab3d {
    fn name(&self) -> &str {
        "slab"
    }

    fn fft(&self, field: ArrayView3<f64>) -> Array3<Complex64> {
        assert_eq!(field.shape(), &self.shape_x_loc()[..]);

        let nkx = self.nkx();
        let ny_loc = self.y_range().len();

        let mut wka = r2c_last_axis(&self.fft_x, field);
        fft_axis(&self.fft_y, wka.view_mut(), Axis(1));

        //Transpose z <-> ky across ranks:
        let blocks = self
            .y_ranges
            .iter()
            .map(|yr| wka.slice(s![.., yr.clone(), ..]).iter().cloned().collect())
            .collect::<Vec<Vec<Complex64>>>();
        let mut received = self
            .z_ranges
            .iter()
            .map(|zr| vec![Complex64::default(); zr.len() * ny_loc * nkx])
            .collect::<Vec<_>>();

        all_to_all(self.comm.as_ref(), &blocks, &mut received, TRANSPOSE_TAG);

        let mut wkb = Array3::zeros((ny_loc, self.nz, nkx));
        for (zr, block) in self.z_ranges.iter().zip(received) {
            let block = Array3::from_shape_vec((zr.len(), ny_loc, nkx), block)
                .expect("block length matches the partition");
            wkb.slice_mut(s![.., zr.clone(), ..])
                .assign(&block.permuted_axes([1, 0, 2]));
        }

        fft_axis(&self.fft_z, wkb.view_mut(), Axis(1));
        normalise(&mut wkb, self.nx * self.ny * self.nz);

        wkb
    }

    fn ifft(&self, field_fft: ArrayView3<Complex64>) -> Array3<f64> {
        assert_eq!(field_fft.shape(), &self.shape_k_loc()[..]);

        let nkx = self.nkx();
        let nz_loc = self.z_range().len();

        let mut wkb = field_fft.to_owned();
        fft_axis(&self.ifft_z, wkb.view_mut(), Axis(1));

        //Transpose back ky <-> z:
        let blocks = self
            .z_ranges
            .iter()
            .map(|zr| {
                wkb.slice(s![.., zr.clone(), ..])
                    .permuted_axes([1, 0, 2])
                    .iter()
                    .cloned()
                    .collect()
            })
            .collect::<Vec<Vec<Complex64>>>();
        let mut received = self
            .y_ranges
            .iter()
            .map(|yr| vec![Complex64::default(); nz_loc * yr.len() * nkx])
            .collect::<Vec<_>>();

        all_to_all(self.comm.as_ref(), &blocks, &mut received, TRANSPOSE_TAG);

        let mut wka = Array3::zeros((nz_loc, self.ny, nkx));
        for (yr, block) in self.y_ranges.iter().zip(received) {
            let block = Array3::from_shape_vec((nz_loc, yr.len(), nkx), block)
                .expect("block length matches the partition");
            wka.slice_mut(s![.., yr.clone(), ..]).assign(&block);
        }

        fft_axis(&self.ifft_y, wka.view_mut(), Axis(1));

        c2r_last_axis(&self.ifft_x, wka.view())
    }

    fn shape_x_seq(&self) -> [usize; 3] {
        [self.nz, self.ny, self.nx]
    }

    fn shape_x_loc(&self) -> [usize; 3] {
        [self.z_range().len(), self.ny, self.nx]
    }

    fn shape_k_seq(&self) -> [usize; 3] {
        [self.ny, self.nz, self.nkx()]
    }

    fn shape_k_loc(&self) -> [usize; 3] {
        [self.y_range().len(), self.nz, self.nkx()]
    }

    fn seq_indices_first_x(&self) -> [usize; 3] {
        [self.z_range().start, 0, 0]
    }

    fn seq_indices_first_k(&self) -> [usize; 3] {
        [self.y_range().start, 0, 0]
    }

    fn dim_mapping(&self) -> DimMapping {
        DimMapping([AXIS_Y, AXIS_Z, AXIS_X])
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{comm::ThreadComm, fft::Sequential3d},
        approx::assert_abs_diff_eq,
    };

    fn field(nz: usize, ny: usize, nx: usize) -> Array3<f64> {
        Array3::from_shape_fn((nz, ny, nx), |(iz, iy, ix)| {
            ((ix + 2 * iy) as f64 * 0.3).sin() * (iz as f64 * 0.9 + 0.1).cos() + iy as f64 * 0.05
        })
    }

    fn matches_sequential(nb_proc: usize, (nx, ny, nz): (usize, usize, usize)) {
        let global = field(nz, ny, nx);
        let seq_fft = Sequential3d::new(nx, ny, nz).fft(global.view());

        ThreadComm::run(nb_proc, |comm| {
            let slab = Slab3d::new(nx, ny, nz, comm).unwrap();
            let [z0, _, _] = slab.seq_indices_first_x();
            let [nz_loc, _, _] = slab.shape_x_loc();
            let local = global.slice(s![z0..z0 + nz_loc, .., ..]);

            let f_fft = slab.fft(local);

            let [ky0, _, _] = slab.seq_indices_first_k();
            let [nky_loc, _, _] = slab.shape_k_loc();
            // Sequential layout is (kz, ky, kx)
            let expected = seq_fft
                .slice(s![.., ky0..ky0 + nky_loc, ..])
                .permuted_axes([1, 0, 2]);
            for (a, b) in f_fft.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(a.re, b.re, epsilon = 1.0E-13);
                assert_abs_diff_eq!(a.im, b.im, epsilon = 1.0E-13);
            }

            let back = slab.ifft(f_fft.view());
            assert_abs_diff_eq!(back, local, epsilon = 1.0E-12);
        });
    }

    #[test]
    fn two_ranks() {
        matches_sequential(2, (8, 6, 4));
    }

    #[test]
    fn uneven_partitions() {
        matches_sequential(3, (6, 8, 5));
    }

    #[test]
    fn one_rank() {
        matches_sequential(1, (4, 4, 4));
    }
}
