//! Spectral operators on a (possibly distributed) 3d periodic domain.

mod coarse;

pub use coarse::ik_from_ikc;

use {
    crate::{
        comm::{Communicator, Tag},
        dealias::{self, DealiasKernel, SpectralArrays},
        decomp::DomainDecomposition,
        error::{Error, Result},
        fft::{self, Sequential2d, SpectralTransform, AXIS_X, AXIS_Y, AXIS_Z},
        parameters::Parameters,
        wavenumbers::{ik_from_kadim, kadim_from_ik, WavenumberGrid},
    },
    log::{debug, info, warn},
    ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Zip},
    num_complex::Complex64,
    std::sync::Arc,
};

const VALUE_TAG: Tag = 32_001;

const I: Complex64 = Complex64 { re: 0.0, im: 1.0 };

pub struct Operators3d {
    params: Parameters,
    /// Domain lengths in (z, y, x) order
    lengths: [f64; 3],

    comm: Arc<dyn Communicator>,
    transform: Box<dyn SpectralTransform>,
    /// Horizontal (y, x) transform, whole plane on every rank
    transform2d: Sequential2d,
    /// `None` when the backend splits more than the first spectral axis
    decomposition: Option<DomainDecomposition>,
    grid: WavenumberGrid,
    kernel: Box<dyn DealiasKernel>,
}

impl Operators3d {
    /// Builds the FFT backend named in `params` and the operators on top of
    /// it. Collective.
    pub fn new(params: &Parameters, comm: Arc<dyn Communicator>) -> Result<Self> {
        let kind = params.validate()?;
        let transform = fft::build(kind, params.grid_size(), comm.clone())?;

        Self::with_transform(params, comm, transform)
    }

    /// Operators on top of an already built backend. Collective.
    pub fn with_transform(
        params: &Parameters,
        comm: Arc<dyn Communicator>,
        transform: Box<dyn SpectralTransform>,
    ) -> Result<Self> {
        params.validate()?;

        let (nx, ny, nz) = params.grid_size();
        if transform.shape_x_seq() != [nz, ny, nx] {
            return Err(Error::configuration(format!(
                "{} FFT is {:?} but the parameters ask for {:?}",
                transform.name(),
                transform.shape_x_seq(),
                [nz, ny, nx]
            )));
        }

        let oper = &params.oper;
        let lengths = [oper.lz, oper.ly, oper.lx];

        let first = transform.seq_indices_first_k();
        let loc = transform.shape_k_loc();
        let seq = transform.shape_k_seq();
        let slab = first[1] == 0 && first[2] == 0 && loc[1] == seq[1] && loc[2] == seq[2];

        // Every rank has to take the same branch
        let decomposition = if comm.all_gather(slab as usize).iter().all(|&s| s == 1) {
            Some(DomainDecomposition::gather(comm.as_ref(), transform.as_ref())?)
        } else {
            warn!(
                "{} FFT splits more than the first spectral axis, coarse grid transfers are unavailable",
                transform.name()
            );
            None
        };

        let grid = WavenumberGrid::new(
            transform.as_ref(),
            lengths,
            oper.coef_dealiasing,
            oper.no_shear_modes,
        );
        let kernel = dealias::kernel(oper.dealiasing_kernel, grid.where_dealiased());

        debug!("2d FFT \"{}\" on {}x{}", oper.type_fft2d, nx, ny);
        let transform2d = Sequential2d::new(nx, ny);

        if comm.rank() == 0 {
            info!(
                "{} FFT, grid {}x{}x{} over {} rank(s), {:?} dealiasing",
                transform.name(),
                nx,
                ny,
                nz,
                comm.size(),
                kernel.kind()
            );
        }
        debug!(
            "rank {}: shape_k_loc {:?}, first index {:?}",
            comm.rank(),
            loc,
            first
        );

        Ok(Self {
            params: params.clone(),
            lengths,
            comm,
            transform,
            transform2d,
            decomposition,
            grid,
            kernel,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn transform(&self) -> &dyn SpectralTransform {
        self.transform.as_ref()
    }

    pub fn transform2d(&self) -> &Sequential2d {
        &self.transform2d
    }

    pub fn grid(&self) -> &WavenumberGrid {
        &self.grid
    }

    /// Slab decomposition of the spectral space
    pub fn decomposition(&self) -> Result<&DomainDecomposition> {
        self.decomposition.as_ref().ok_or_else(|| {
            Error::unimplemented(format!(
                "{} FFT is decomposed along more than one spectral axis",
                self.transform.name()
            ))
        })
    }

    pub fn shape_x_loc(&self) -> [usize; 3] {
        self.transform.shape_x_loc()
    }

    pub fn shape_x_seq(&self) -> [usize; 3] {
        self.transform.shape_x_seq()
    }

    pub fn shape_k_loc(&self) -> [usize; 3] {
        self.transform.shape_k_loc()
    }

    pub fn shape_k_seq(&self) -> [usize; 3] {
        self.transform.shape_k_seq()
    }

    /// Global spectral shape in (kz, ky, kx) order, the layout of coarse
    /// and restart arrays
    pub fn shape_k_canonical(&self) -> [usize; 3] {
        self.transform.dim_mapping().to_zyx(self.shape_k_seq())
    }

    pub fn create_array_x(&self) -> Array3<f64> {
        let [n0, n1, n2] = self.shape_x_loc();
        Array3::zeros((n0, n1, n2))
    }

    pub fn create_array_k(&self) -> Array3<Complex64> {
        let [n0, n1, n2] = self.shape_k_loc();
        Array3::zeros((n0, n1, n2))
    }

    pub fn fft(&self, field: ArrayView3<f64>) -> Array3<Complex64> {
        self.transform.fft(field)
    }

    pub fn ifft(&self, field_fft: ArrayView3<Complex64>) -> Array3<f64> {
        self.transform.ifft(field_fft)
    }

    pub fn fft2d(&self, field: ArrayView2<f64>) -> Array2<Complex64> {
        self.transform2d.fft(field)
    }

    pub fn ifft2d(&self, field_fft: ArrayView2<Complex64>) -> Array2<f64> {
        self.transform2d.ifft(field_fft)
    }

    /// Local part of the 3d physical field equal to the (y, x) field
    /// `arr2d` at every height.
    pub fn build_invariant_array_x_from_2d(&self, arr2d: ArrayView2<f64>) -> Result<Array3<f64>> {
        let [_, ny, nx] = self.shape_x_seq();
        if arr2d.dim() != (ny, nx) {
            return Err(Error::configuration(format!(
                "2d field has shape {:?}, expected {:?}",
                arr2d.shape(),
                [ny, nx]
            )));
        }

        let [_, y0, x0] = self.transform.seq_indices_first_x();
        let [nz_loc, ny_loc, nx_loc] = self.shape_x_loc();

        Ok(Array3::from_shape_fn((nz_loc, ny_loc, nx_loc), |(_, iy, ix)| {
            arr2d[[y0 + iy, x0 + ix]]
        }))
    }

    /// Spectral counterpart of [`Self::build_invariant_array_x_from_2d`]:
    /// the (ky, kx) coefficients of `arr2d_fft` land on the kz = 0 plane,
    /// held by the ranks owning it, and every other mode is zero.
    pub fn build_invariant_array_k_from_2d(
        &self,
        arr2d_fft: ArrayView2<Complex64>,
    ) -> Result<Array3<Complex64>> {
        let expected = self.transform2d.shape_k();
        if arr2d_fft.shape() != &expected[..] {
            return Err(Error::configuration(format!(
                "2d spectral field has shape {:?}, expected {:?}",
                arr2d_fft.shape(),
                expected
            )));
        }

        let mapping = self.transform.dim_mapping();
        let first = self.transform.seq_indices_first_k();
        let [n0, n1, n2] = self.shape_k_loc();

        Ok(Array3::from_shape_fn((n0, n1, n2), |(i0, i1, i2)| {
            let [ikz, iky, ikx] =
                mapping.to_zyx([first[0] + i0, first[1] + i1, first[2] + i2]);
            if ikz == 0 {
                arr2d_fft[[iky, ikx]]
            } else {
                Complex64::default()
            }
        }))
    }

    /// Zeroes the coefficients removed by the dealiasing mask in every
    /// array of `target`.
    pub fn dealias<T: SpectralArrays + ?Sized>(&self, target: &mut T) {
        self.kernel.apply(target.stack_mut());
    }

    pub fn dealiased(&self, field_fft: ArrayView3<Complex64>) -> Array3<Complex64> {
        let mut out = field_fft.to_owned();
        self.dealias(&mut out);
        out
    }

    /// Helmholtz decomposition of a horizontal velocity field into its
    /// toroidal (rotational) and poloidal (divergent) parts. Returns
    /// (urx, ury, udx, udy).
    pub fn toroidal_poloidal_from_horizontal_velocity(
        &self,
        vx_fft: ArrayView3<Complex64>,
        vy_fft: ArrayView3<Complex64>,
    ) -> (
        Array3<Complex64>,
        Array3<Complex64>,
        Array3<Complex64>,
        Array3<Complex64>,
    ) {
        let kx = self.grid.kx();
        let ky = self.grid.ky();

        let kdotu_over_kh2 = Zip::from(&vx_fft)
            .and(&vy_fft)
            .and(&kx)
            .and(&ky)
            .and(&self.grid.inv_kh_square_nozero())
            .par_map_collect(|&vx, &vy, &kx, &ky, &inv| (vx * kx + vy * ky) * inv);

        let udx = Zip::from(&kx)
            .and(&kdotu_over_kh2)
            .par_map_collect(|&kx, &d| d * kx);
        let udy = Zip::from(&ky)
            .and(&kdotu_over_kh2)
            .par_map_collect(|&ky, &d| d * ky);

        let urx = &vx_fft - &udx;
        let ury = &vy_fft - &udy;

        (urx, ury, udx, udy)
    }

    pub fn horizontal_divergence(
        &self,
        vx_fft: ArrayView3<Complex64>,
        vy_fft: ArrayView3<Complex64>,
    ) -> Array3<Complex64> {
        Zip::from(&vx_fft)
            .and(&vy_fft)
            .and(&self.grid.kx())
            .and(&self.grid.ky())
            .par_map_collect(|&vx, &vy, &kx, &ky| I * (vx * kx + vy * ky))
    }

    /// Horizontal velocity of the vertical vorticity `rotz_fft`, with the
    /// horizontally uniform modes regularised.
    pub fn horizontal_velocity_from_vorticity(
        &self,
        rotz_fft: ArrayView3<Complex64>,
    ) -> (Array3<Complex64>, Array3<Complex64>) {
        let inv = self.grid.inv_kh_square_nozero();

        let vx = Zip::from(&rotz_fft)
            .and(&self.grid.ky())
            .and(&inv)
            .par_map_collect(|&rot, &ky, &inv| I * ky * inv * rot);
        let vy = Zip::from(&rotz_fft)
            .and(&self.grid.kx())
            .and(&inv)
            .par_map_collect(|&rot, &kx, &inv| -I * kx * inv * rot);

        (vx, vy)
    }

    /// Drops the part of `field_fft` that a real field cannot represent.
    pub fn project_onto_real_field(&self, field_fft: ArrayView3<Complex64>) -> Array3<Complex64> {
        self.fft(self.ifft(field_fft).view())
    }

    pub fn gradient(
        &self,
        f_fft: ArrayView3<Complex64>,
    ) -> (Array3<Complex64>, Array3<Complex64>, Array3<Complex64>) {
        let derivative = |k: ArrayView3<f64>| {
            Zip::from(&f_fft)
                .and(&k)
                .par_map_collect(|&f, &k| I * k * f)
        };

        (
            derivative(self.grid.kx()),
            derivative(self.grid.ky()),
            derivative(self.grid.kz()),
        )
    }

    pub fn divergence(
        &self,
        vx_fft: ArrayView3<Complex64>,
        vy_fft: ArrayView3<Complex64>,
        vz_fft: ArrayView3<Complex64>,
    ) -> Array3<Complex64> {
        let mut div = self.k_dot(vx_fft, vy_fft, vz_fft);
        div.par_mapv_inplace(|d| I * d);
        div
    }

    // K·v
    fn k_dot(
        &self,
        vx_fft: ArrayView3<Complex64>,
        vy_fft: ArrayView3<Complex64>,
        vz_fft: ArrayView3<Complex64>,
    ) -> Array3<Complex64> {
        let mut kdotv = Zip::from(&vx_fft)
            .and(&vy_fft)
            .and(&self.grid.kx())
            .and(&self.grid.ky())
            .par_map_collect(|&vx, &vy, &kx, &ky| kx * vx + ky * vy);
        Zip::from(&mut kdotv)
            .and(&vz_fft)
            .and(&self.grid.kz())
            .par_for_each(|d, &vz, &kz| *d += kz * vz);
        kdotv
    }

    pub fn curl(
        &self,
        vx_fft: ArrayView3<Complex64>,
        vy_fft: ArrayView3<Complex64>,
        vz_fft: ArrayView3<Complex64>,
    ) -> (Array3<Complex64>, Array3<Complex64>, Array3<Complex64>) {
        let (kx, ky, kz) = (self.grid.kx(), self.grid.ky(), self.grid.kz());

        // i (k_a v_b - k_b v_a)
        let cross = |ka: &ArrayView3<f64>,
                     vb: &ArrayView3<Complex64>,
                     kb: &ArrayView3<f64>,
                     va: &ArrayView3<Complex64>| {
            Zip::from(ka)
                .and(vb)
                .and(kb)
                .and(va)
                .par_map_collect(|&ka, &vb, &kb, &va| I * (ka * vb - kb * va))
        };

        (
            cross(&ky, &vz_fft, &kz, &vy_fft),
            cross(&kz, &vx_fft, &kx, &vz_fft),
            cross(&kx, &vy_fft, &ky, &vx_fft),
        )
    }

    /// Divergence-free velocity whose curl is the vorticity (ωx, ωy, ωz)
    pub fn velocity_from_vorticity(
        &self,
        rotx_fft: ArrayView3<Complex64>,
        roty_fft: ArrayView3<Complex64>,
        rotz_fft: ArrayView3<Complex64>,
    ) -> (Array3<Complex64>, Array3<Complex64>, Array3<Complex64>) {
        let (mut vx, mut vy, mut vz) = self.curl(rotx_fft, roty_fft, rotz_fft);

        let inv = self.grid.inv_k_square_nozero();
        for v in [&mut vx, &mut vy, &mut vz].iter_mut() {
            Zip::from(&mut **v)
                .and(&inv)
                .par_for_each(|v, &inv| *v *= inv);
        }

        (vx, vy, vz)
    }

    /// Removes in place the component of v along the wavevector.
    pub fn project_perpk(
        &self,
        mut vx_fft: ArrayViewMut3<Complex64>,
        mut vy_fft: ArrayViewMut3<Complex64>,
        mut vz_fft: ArrayViewMut3<Complex64>,
    ) {
        let (kx, ky, kz) = (self.grid.kx(), self.grid.ky(), self.grid.kz());

        let mut kdotv = self.k_dot(vx_fft.view(), vy_fft.view(), vz_fft.view());
        Zip::from(&mut kdotv)
            .and(&self.grid.inv_k_square_nozero())
            .par_for_each(|d, &inv| *d *= inv);

        Zip::from(&mut vx_fft)
            .and(&kx)
            .and(&kdotv)
            .par_for_each(|v, &k, &d| *v -= d * k);
        Zip::from(&mut vy_fft)
            .and(&ky)
            .and(&kdotv)
            .par_for_each(|v, &k, &d| *v -= d * k);
        Zip::from(&mut vz_fft)
            .and(&kz)
            .and(&kdotv)
            .par_for_each(|v, &k, &d| *v -= d * k);
    }

    /// Sum over the whole Hermitian spectrum of a real spectral quantity
    /// (for instance |f_fft|²), reduced over all ranks. Collective.
    pub fn sum_wavenumbers(&self, field: ArrayView3<f64>) -> f64 {
        let nx = self.shape_x_seq()[AXIS_X];
        let axis = self.transform.dim_mapping().k_axis(AXIS_X);
        let first = self.transform.seq_indices_first_k()[axis];

        // Modes kx > 0 stand for their conjugates
        let local = field
            .axis_iter(Axis(axis))
            .enumerate()
            .map(|(i, plane)| {
                let ikx = first + i;
                let weight = if ikx == 0 || (nx % 2 == 0 && ikx == nx / 2) {
                    1.0
                } else {
                    2.0
                };
                weight * plane.sum()
            })
            .sum::<f64>();

        self.comm.all_reduce_sum(local)
    }

    /// Dimensionless wavenumbers (kz, ky, kx) of a global spectral index
    /// triple
    pub fn kadim_from_ik012(&self, ik: [usize; 3]) -> [isize; 3] {
        let mapping = self.transform.dim_mapping();
        let n = self.shape_x_seq();
        let zyx = mapping.to_zyx(ik);

        [
            kadim_from_ik(zyx[AXIS_Z], n[AXIS_Z]),
            kadim_from_ik(zyx[AXIS_Y], n[AXIS_Y]),
            zyx[AXIS_X] as isize,
        ]
    }

    /// Global spectral index triple of the dimensionless wavenumbers
    /// (kz, ky, kx)
    pub fn ik012_from_kadim(&self, kadim: [isize; 3]) -> Result<[usize; 3]> {
        let n = self.shape_x_seq();
        let nkx = n[AXIS_X] / 2 + 1;

        for &axis in &[AXIS_Z, AXIS_Y] {
            let half = (n[axis] / 2) as isize;
            let lowest = half + 1 - n[axis] as isize;
            if kadim[axis] < lowest || kadim[axis] > half {
                return Err(Error::out_of_range(axis, kadim[axis], n[axis]));
            }
        }
        if kadim[AXIS_X] < 0 || kadim[AXIS_X] >= nkx as isize {
            return Err(Error::out_of_range(AXIS_X, kadim[AXIS_X], nkx));
        }

        let zyx = [
            ik_from_kadim(kadim[AXIS_Z], n[AXIS_Z]),
            ik_from_kadim(kadim[AXIS_Y], n[AXIS_Y]),
            kadim[AXIS_X] as usize,
        ];

        Ok(self.transform.dim_mapping().to_k(zyx))
    }

    /// Writes `value` at the dimensionless wavenumbers (kz, ky, kx) on the
    /// rank owning them.
    pub fn set_value_spect(
        &self,
        mut field_fft: ArrayViewMut3<Complex64>,
        value: Complex64,
        kadim: [isize; 3],
    ) -> Result<()> {
        let ik = self.ik012_from_kadim(kadim)?;
        let loc = self
            .decomposition()?
            .locate_wavenumber(ik[0], ik[1] as isize, ik[2] as isize)?;

        if loc.rank == self.rank() {
            field_fft[[loc.ik0, loc.ik1, loc.ik2]] = value;
        }

        Ok(())
    }

    /// Value at the dimensionless wavenumbers (kz, ky, kx), returned on
    /// rank 0 only. Collective.
    pub fn get_value_spect(
        &self,
        field_fft: ArrayView3<Complex64>,
        kadim: [isize; 3],
    ) -> Result<Option<Complex64>> {
        let ik = self.ik012_from_kadim(kadim)?;
        let loc = self
            .decomposition()?
            .locate_wavenumber(ik[0], ik[1] as isize, ik[2] as isize)?;
        let rank = self.rank();

        let value = if loc.rank == rank {
            field_fft[[loc.ik0, loc.ik1, loc.ik2]]
        } else {
            Complex64::default()
        };

        if loc.rank == 0 {
            Ok(if rank == 0 { Some(value) } else { None })
        } else if rank == loc.rank {
            self.comm.send(&[value], 0, VALUE_TAG);
            Ok(None)
        } else if rank == 0 {
            let mut buf = [Complex64::default()];
            self.comm.receive(&mut buf, loc.rank, VALUE_TAG);
            Ok(Some(buf[0]))
        } else {
            Ok(None)
        }
    }

    /// Coordinates of the global physical grid along `axis`
    pub fn grid1d_seq(&self, axis: usize) -> Array1<f64> {
        let length = self.lengths[axis];

        if self.params.only_coarse_oper {
            let oper = &self.params.oper;
            let n = [oper.nz, oper.ny, oper.nx][axis];
            Array1::linspace(0.0, length, n)
        } else {
            let n = self.shape_x_seq()[axis];
            Array1::from_shape_fn(n, |i| i as f64 * length / n as f64)
        }
    }
}
