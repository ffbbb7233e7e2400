//! Wavenumber arrays and the dealiasing mask of the local spectral slice.

use {
    crate::fft::{SpectralTransform, AXIS_X, AXIS_Y, AXIS_Z},
    ndarray::{Array3, ArrayView3, Zip},
    std::f64::consts::PI,
};

/// Replaces vanishing squared wavenumbers before inversion, so that the
/// inverse at k = 0 is 1e14 instead of inf or NaN.
pub const ZERO_WAVENUMBER_EPSILON: f64 = 1.0E-14;

/// Signed dimensionless wavenumber of index `ik` on an axis of `n` points
pub fn kadim_from_ik(ik: usize, n: usize) -> isize {
    if ik <= n / 2 {
        ik as isize
    } else {
        ik as isize - n as isize
    }
}

/// Index of the signed dimensionless wavenumber `kadim` on an axis of `n`
/// points
pub fn ik_from_kadim(kadim: isize, n: usize) -> usize {
    if kadim >= 0 {
        kadim as usize
    } else {
        (n as isize + kadim) as usize
    }
}

fn inverse_nozero(k2: f64) -> f64 {
    if k2 == 0.0 {
        1.0 / ZERO_WAVENUMBER_EPSILON
    } else {
        1.0 / k2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WavenumberGrid {
    /// 2π/L in (z, y, x) order
    deltak: [f64; 3],
    /// Largest wavenumber of each axis in (z, y, x) order
    k_max: [f64; 3],

    kx: Array3<f64>,
    ky: Array3<f64>,
    kz: Array3<f64>,
    inv_kh_square_nozero: Array3<f64>,
    inv_k_square_nozero: Array3<f64>,
    where_dealiased: Array3<u8>,
}

impl WavenumberGrid {
    /// `lengths` are the domain lengths in (z, y, x) order.
    pub fn new(
        transform: &dyn SpectralTransform,
        lengths: [f64; 3],
        coef_dealiasing: f64,
        no_shear_modes: bool,
    ) -> Self {
        let n = transform.shape_x_seq();
        let shape = transform.shape_k_loc();
        let first = transform.seq_indices_first_k();
        let mapping = transform.dim_mapping();

        let deltak = [
            2.0 * PI / lengths[AXIS_Z],
            2.0 * PI / lengths[AXIS_Y],
            2.0 * PI / lengths[AXIS_X],
        ];
        let k_max = [
            deltak[AXIS_Z] * (n[AXIS_Z] / 2) as f64,
            deltak[AXIS_Y] * (n[AXIS_Y] / 2) as f64,
            deltak[AXIS_X] * (n[AXIS_X] / 2) as f64,
        ];

        //Dimensionless wavenumbers along physical axis `axis`:
        let wavenumber = |axis: usize| {
            Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(i0, i1, i2)| {
                let zyx = mapping.to_zyx([i0 + first[0], i1 + first[1], i2 + first[2]]);
                let kadim = if axis == AXIS_X {
                    // Half axis of the real to complex transform
                    zyx[AXIS_X] as isize
                } else {
                    kadim_from_ik(zyx[axis], n[axis])
                };
                deltak[axis] * kadim as f64
            })
        };

        let kz = wavenumber(AXIS_Z);
        let ky = wavenumber(AXIS_Y);
        let kx = wavenumber(AXIS_X);

        let inv_kh_square_nozero = Zip::from(&kx)
            .and(&ky)
            .map_collect(|kx, ky| inverse_nozero(kx * kx + ky * ky));
        let inv_k_square_nozero = Zip::from(&kx)
            .and(&ky)
            .and(&kz)
            .map_collect(|kx, ky, kz| inverse_nozero(kx * kx + ky * ky + kz * kz));

        let mut where_dealiased = Zip::from(&kx).and(&ky).and(&kz).map_collect(|kx, ky, kz| {
            (kx.abs() > coef_dealiasing * k_max[AXIS_X]
                || ky.abs() > coef_dealiasing * k_max[AXIS_Y]
                || kz.abs() > coef_dealiasing * k_max[AXIS_Z]) as u8
        });

        if no_shear_modes {
            Zip::from(&mut where_dealiased)
                .and(&kx)
                .and(&ky)
                .for_each(|w, kx, ky| {
                    if kx * kx + ky * ky == 0.0 {
                        *w = 1;
                    }
                });
        }

        Self {
            deltak,
            k_max,
            kx,
            ky,
            kz,
            inv_kh_square_nozero,
            inv_k_square_nozero,
            where_dealiased,
        }
    }

    pub fn kx(&self) -> ArrayView3<f64> {
        self.kx.view()
    }

    pub fn ky(&self) -> ArrayView3<f64> {
        self.ky.view()
    }

    pub fn kz(&self) -> ArrayView3<f64> {
        self.kz.view()
    }

    /// 1/(Kx² + Ky²), with the zero wavenumber regularised
    pub fn inv_kh_square_nozero(&self) -> ArrayView3<f64> {
        self.inv_kh_square_nozero.view()
    }

    /// 1/(Kx² + Ky² + Kz²), with the zero wavenumber regularised
    pub fn inv_k_square_nozero(&self) -> ArrayView3<f64> {
        self.inv_k_square_nozero.view()
    }

    /// 1 where the coefficient is removed by dealiasing
    pub fn where_dealiased(&self) -> ArrayView3<u8> {
        self.where_dealiased.view()
    }

    /// 2π/L in (z, y, x) order
    pub fn deltak(&self) -> [f64; 3] {
        self.deltak
    }

    /// Largest wavenumbers in (z, y, x) order
    pub fn k_max(&self) -> [f64; 3] {
        self.k_max
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            comm::ThreadComm,
            fft::{Sequential3d, Slab3d},
        },
        approx::assert_abs_diff_eq,
        ndarray::s,
    };

    #[test]
    fn dimensionless_wavenumbers() {
        let kadim = (0..6).map(|ik| kadim_from_ik(ik, 6)).collect::<Vec<_>>();
        assert_eq!(kadim, vec![0, 1, 2, 3, -2, -1]);

        for ik in 0..7 {
            assert_eq!(ik_from_kadim(kadim_from_ik(ik, 7), 7), ik);
        }
    }

    #[test]
    fn sequential_grid() {
        let fft = Sequential3d::new(8, 4, 6);
        let grid = WavenumberGrid::new(&fft, [2.0 * PI, PI, 4.0 * PI], 1.0, false);

        assert_eq!(grid.kx().dim(), (6, 4, 5));
        assert_abs_diff_eq!(grid.kx()[[0, 0, 3]], 1.5);
        assert_abs_diff_eq!(grid.ky()[[0, 3, 0]], -2.0);
        assert_abs_diff_eq!(grid.kz()[[4, 0, 0]], -2.0);
        assert_eq!(grid.k_max(), [3.0, 4.0, 2.0]);
        // Nothing is above the largest wavenumbers
        assert!(grid.where_dealiased().iter().all(|&w| w == 0));
    }

    #[test]
    fn zero_wavenumber_is_regularised() {
        let fft = Sequential3d::new(4, 4, 4);
        let grid = WavenumberGrid::new(&fft, [2.0 * PI; 3], 2.0 / 3.0, false);

        assert_eq!(grid.inv_kh_square_nozero()[[0, 0, 0]], 1.0 / 1.0E-14);
        assert_eq!(grid.inv_kh_square_nozero()[[3, 0, 0]], 1.0 / 1.0E-14);
        assert_eq!(grid.inv_k_square_nozero()[[0, 0, 0]], 1.0 / 1.0E-14);
        assert_abs_diff_eq!(grid.inv_k_square_nozero()[[3, 0, 0]], 1.0);
        assert!(grid.inv_kh_square_nozero().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn dealiasing_mask() {
        let fft = Sequential3d::new(12, 12, 12);
        let grid = WavenumberGrid::new(&fft, [2.0 * PI; 3], 2.0 / 3.0, false);

        // Cutoff at 4: kadim 5 and 6 are removed on each axis
        let mask = grid.where_dealiased();
        assert_eq!(mask[[0, 0, 4]], 0);
        assert_eq!(mask[[0, 0, 5]], 1);
        assert_eq!(mask[[8, 0, 0]], 0);
        assert_eq!(mask[[7, 0, 0]], 1);
        assert_eq!(mask[[0, 0, 0]], 0);

        let grid = WavenumberGrid::new(&fft, [2.0 * PI; 3], 2.0 / 3.0, true);
        let mask = grid.where_dealiased();
        assert!(mask.slice(s![.., 0, 0]).iter().all(|&w| w == 1));
        assert_eq!(mask[[0, 1, 0]], 0);
    }

    #[test]
    fn slab_grid_matches_sequential() {
        let seq = WavenumberGrid::new(&Sequential3d::new(6, 8, 4), [2.0 * PI; 3], 2.0 / 3.0, true);

        ThreadComm::run(3, |comm| {
            let fft = Slab3d::new(6, 8, 4, comm).unwrap();
            let grid = WavenumberGrid::new(&fft, [2.0 * PI; 3], 2.0 / 3.0, true);
            let ky0 = fft.seq_indices_first_k()[0];
            let nky = fft.shape_k_loc()[0];

            // Slab layout is (ky, kz, kx)
            let expected = |a: ArrayView3<f64>| {
                a.slice_move(s![.., ky0..ky0 + nky, ..])
                    .permuted_axes([1, 0, 2])
                    .to_owned()
            };
            assert_eq!(grid.kx().to_owned(), expected(seq.kx()));
            assert_eq!(grid.ky().to_owned(), expected(seq.ky()));
            assert_eq!(grid.kz().to_owned(), expected(seq.kz()));

            let mask = seq
                .where_dealiased()
                .slice_move(s![.., ky0..ky0 + nky, ..])
                .permuted_axes([1, 0, 2])
                .to_owned();
            assert_eq!(grid.where_dealiased().to_owned(), mask);
        });
    }
}
