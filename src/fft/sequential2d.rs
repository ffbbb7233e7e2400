use {
    super::lines::{c2r_last_axis, fft_axis, normalise, r2c_last_axis},
    ndarray::{Array2, ArrayView2, Axis},
    num_complex::Complex64,
    rustfft::{Fft, FftPlanner},
    std::sync::Arc,
};

/// Single rank transform of horizontal (y, x) fields. Spectral arrays are
/// laid out (ky, kx) with the half axis last, and every rank holds the
/// whole plane.
pub struct Sequential2d {
    pub nx: usize,
    pub ny: usize,

    fft_x: Arc<dyn Fft<f64>>,
    fft_y: Arc<dyn Fft<f64>>,
    ifft_x: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
}

impl Sequential2d {
    pub fn new(nx: usize, ny: usize) -> Self {
        let mut planner = FftPlanner::new();

        Self {
            nx,
            ny,
            fft_x: planner.plan_fft_forward(nx),
            fft_y: planner.plan_fft_forward(ny),
            ifft_x: planner.plan_fft_inverse(nx),
            ifft_y: planner.plan_fft_inverse(ny),
        }
    }

    pub fn shape_x(&self) -> [usize; 2] {
        [self.ny, self.nx]
    }

    pub fn shape_k(&self) -> [usize; 2] {
        [self.ny, self.nx / 2 + 1]
    }

    /// Forward transform, normalised by 1/(nx*ny).
    pub fn fft(&self, field: ArrayView2<f64>) -> Array2<Complex64> {
        assert_eq!(field.shape(), &self.shape_x()[..]);

        let mut field_fft = r2c_last_axis(&self.fft_x, field.insert_axis(Axis(0)));
        fft_axis(&self.fft_y, field_fft.view_mut(), Axis(1));
        normalise(&mut field_fft, self.nx * self.ny);

        field_fft.index_axis_move(Axis(0), 0)
    }

    pub fn ifft(&self, field_fft: ArrayView2<Complex64>) -> Array2<f64> {
        assert_eq!(field_fft.shape(), &self.shape_k()[..]);

        let mut wks = field_fft.insert_axis(Axis(0)).to_owned();
        fft_axis(&self.ifft_y, wks.view_mut(), Axis(1));

        c2r_last_axis(&self.ifft_x, wks.view()).index_axis_move(Axis(0), 0)
    }
}

#[cfg(test)]
mod test {
    use {super::*, approx::assert_abs_diff_eq, std::f64::consts::PI};

    #[test]
    fn round_trip() {
        let fft = Sequential2d::new(10, 6);
        let f = Array2::from_shape_fn((6, 10), |(iy, ix)| {
            (ix as f64 * 0.3).cos() * (iy as f64 * 1.1).sin() + 0.01 * (iy * ix) as f64
        });

        let f2 = fft.ifft(fft.fft(f.view()).view());

        assert_abs_diff_eq!(f, f2, epsilon = 1.0E-12);
    }

    #[test]
    fn single_mode() {
        let (nx, ny) = (8, 6);
        let fft = Sequential2d::new(nx, ny);

        // sin(x - 2y) = (e^{i(x-2y)} - e^{-i(x-2y)})/2i
        let f = Array2::from_shape_fn((ny, nx), |(iy, ix)| {
            let x = 2.0 * PI * ix as f64 / nx as f64;
            let y = 2.0 * PI * iy as f64 / ny as f64;
            (x - 2.0 * y).sin()
        });

        let f_fft = fft.fft(f.view());

        assert_eq!(f_fft.dim(), (6, 5));
        for ((iy, ix), c) in f_fft.indexed_iter() {
            let expected = if (iy, ix) == (ny - 2, 1) { -0.5 } else { 0.0 };
            assert_abs_diff_eq!(c.re, 0.0, epsilon = 1.0E-14);
            assert_abs_diff_eq!(c.im, expected, epsilon = 1.0E-14);
        }
    }
}
