//! One dimensional transforms applied along every lane of a 3d array.
//! Lanes are independent so they are spread over the rayon pool.

use {
    ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut3, Axis, Zip},
    num_complex::Complex64,
    rustfft::Fft,
    std::sync::Arc,
};

/// Complex transform along `axis`, in place.
pub fn fft_axis(plan: &Arc<dyn Fft<f64>>, mut data: ArrayViewMut3<Complex64>, axis: Axis) {
    assert_eq!(plan.len(), data.len_of(axis));

    Zip::from(data.lanes_mut(axis)).par_for_each(|mut lane| {
        let mut buf = lane.to_vec();
        plan.process(&mut buf);
        lane.assign(&ArrayView1::from(&buf));
    });
}

/// Real to complex transform along the last axis. Only the n/2 + 1
/// non-negative frequencies are kept.
pub fn r2c_last_axis(plan: &Arc<dyn Fft<f64>>, input: ArrayView3<f64>) -> Array3<Complex64> {
    let (n0, n1, n) = input.dim();
    assert_eq!(plan.len(), n);

    let mut output = Array3::zeros((n0, n1, n / 2 + 1));

    Zip::from(output.lanes_mut(Axis(2)))
        .and(input.lanes(Axis(2)))
        .par_for_each(|mut out, inp| {
            let mut buf = inp
                .iter()
                .map(|&x| Complex64::new(x, 0.0))
                .collect::<Vec<_>>();
            plan.process(&mut buf);
            out.iter_mut().zip(&buf).for_each(|(o, b)| *o = *b);
        });

    output
}

/// Complex to real inverse transform along the last axis, from the n/2 + 1
/// non-negative frequencies. The negative frequencies are rebuilt by
/// Hermitian symmetry and the real part of the result is kept, which drops
/// any component that does not belong to a real field.
pub fn c2r_last_axis(plan: &Arc<dyn Fft<f64>>, input: ArrayView3<Complex64>) -> Array3<f64> {
    let n = plan.len();
    let (n0, n1, nk) = input.dim();
    assert_eq!(nk, n / 2 + 1);

    let mut output = Array3::zeros((n0, n1, n));

    Zip::from(output.lanes_mut(Axis(2)))
        .and(input.lanes(Axis(2)))
        .par_for_each(|mut out, inp| {
            let mut buf = vec![Complex64::default(); n];
            for (k, c) in inp.iter().enumerate() {
                buf[k] = *c;
            }
            for k in nk..n {
                buf[k] = buf[n - k].conj();
            }
            plan.process(&mut buf);
            out.iter_mut().zip(&buf).for_each(|(o, b)| *o = b.re);
        });

    output
}

/// Multiplies every coefficient by `1/n`.
pub fn normalise(data: &mut Array3<Complex64>, n: usize) {
    let inv = 1.0 / n as f64;
    data.par_mapv_inplace(|c| c * inv);
}
