//! Helpers shared by the test modules.

use {
    ndarray::{Array3, ArrayView3},
    num_complex::Complex64,
    rand::{rngs::StdRng, Rng, SeedableRng},
};

/// Reproducible uniform random physical field of shape (nz, ny, nx)
pub(crate) fn random_field(shape: [usize; 3], seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_simple_fn((shape[0], shape[1], shape[2]), || rng.gen_range(-1.0..1.0))
}

pub(crate) fn assert_complex_eq(a: ArrayView3<Complex64>, b: ArrayView3<Complex64>, epsilon: f64) {
    assert_eq!(a.shape(), b.shape());
    for ((i, x), y) in a.indexed_iter().zip(b.iter()) {
        approx::assert_abs_diff_eq!(x.re, y.re, epsilon = epsilon);
        assert!(
            (x.im - y.im).abs() <= epsilon,
            "imaginary parts differ at {:?}: {} != {}",
            i,
            x.im,
            y.im
        );
    }
}
