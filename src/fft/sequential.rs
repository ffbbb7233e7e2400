use {
    super::{
        lines::{c2r_last_axis, fft_axis, normalise, r2c_last_axis},
        DimMapping, SpectralTransform,
    },
    ndarray::{Array3, ArrayView3, Axis},
    num_complex::Complex64,
    rustfft::{Fft, FftPlanner},
    std::sync::Arc,
};

/// Single rank 3d transform. Spectral arrays are laid out (kz, ky, kx).
pub struct Sequential3d {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    fft_x: Arc<dyn Fft<f64>>,
    fft_y: Arc<dyn Fft<f64>>,
    fft_z: Arc<dyn Fft<f64>>,
    ifft_x: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
    ifft_z: Arc<dyn Fft<f64>>,
}

impl Sequential3d {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        let mut planner = FftPlanner::new();

        Self {
            nx,
            ny,
            nz,
            fft_x: planner.plan_fft_forward(nx),
            fft_y: planner.plan_fft_forward(ny),
            fft_z: planner.plan_fft_forward(nz),
            ifft_x: planner.plan_fft_inverse(nx),
            ifft_y: planner.plan_fft_inverse(ny),
            ifft_z: planner.plan_fft_inverse(nz),
        }
    }
}

impl SpectralTransform for Sequential3d {
    fn name(&self) -> &str {
        "sequential"
    }

    fn fft(&self, field: ArrayView3<f64>) -> Array3<Complex64> {
        assert_eq!(field.shape(), &self.shape_x_loc()[..]);

        let mut field_fft = r2c_last_axis(&self.fft_x, field);
        fft_axis(&self.fft_y, field_fft.view_mut(), Axis(1));
        fft_axis(&self.fft_z, field_fft.view_mut(), Axis(0));
        normalise(&mut field_fft, self.nx * self.ny * self.nz);

        field_fft
    }

    fn ifft(&self, field_fft: ArrayView3<Complex64>) -> Array3<f64> {
        assert_eq!(field_fft.shape(), &self.shape_k_loc()[..]);

        let mut wks = field_fft.to_owned();
        fft_axis(&self.ifft_z, wks.view_mut(), Axis(0));
        fft_axis(&self.ifft_y, wks.view_mut(), Axis(1));

        c2r_last_axis(&self.ifft_x, wks.view())
    }

    fn shape_x_seq(&self) -> [usize; 3] {
        [self.nz, self.ny, self.nx]
    }

    fn shape_x_loc(&self) -> [usize; 3] {
        self.shape_x_seq()
    }

    fn shape_k_seq(&self) -> [usize; 3] {
        [self.nz, self.ny, self.nx / 2 + 1]
    }

    fn shape_k_loc(&self) -> [usize; 3] {
        self.shape_k_seq()
    }

    fn seq_indices_first_x(&self) -> [usize; 3] {
        [0; 3]
    }

    fn seq_indices_first_k(&self) -> [usize; 3] {
        [0; 3]
    }

    fn dim_mapping(&self) -> DimMapping {
        DimMapping::IDENTITY
    }
}

#[cfg(test)]
mod test {
    use {super::*, approx::assert_abs_diff_eq, ndarray::Array3};

    fn field(nz: usize, ny: usize, nx: usize) -> Array3<f64> {
        Array3::from_shape_fn((nz, ny, nx), |(iz, iy, ix)| {
            (ix as f64 * 0.7).sin() + (iy as f64 * 1.3 + iz as f64).cos() * 0.5
                + (iz * ix) as f64 * 0.01
        })
    }

    #[test]
    fn round_trip() {
        let fft = Sequential3d::new(8, 6, 5);
        let f = field(5, 6, 8);

        let f2 = fft.ifft(fft.fft(f.view()).view());

        assert_abs_diff_eq!(f, f2, epsilon = 1.0E-12);
    }

    #[test]
    fn single_mode() {
        let (nx, ny, nz) = (8, 4, 4);
        let fft = Sequential3d::new(nx, ny, nz);

        // cos(2x + y) = (e^{i(2x+y)} + e^{-i(2x+y)})/2
        let f = Array3::from_shape_fn((nz, ny, nx), |(_, iy, ix)| {
            let x = 2.0 * std::f64::consts::PI * ix as f64 / nx as f64;
            let y = 2.0 * std::f64::consts::PI * iy as f64 / ny as f64;
            (2.0 * x + y).cos()
        });

        let f_fft = fft.fft(f.view());

        assert_eq!(f_fft.dim(), (4, 4, 5));
        for ((iz, iy, ix), c) in f_fft.indexed_iter() {
            let expected = if (iz, iy, ix) == (0, 1, 2) { 0.5 } else { 0.0 };
            assert_abs_diff_eq!(c.re, expected, epsilon = 1.0E-14);
            assert_abs_diff_eq!(c.im, 0.0, epsilon = 1.0E-14);
        }
    }
}
