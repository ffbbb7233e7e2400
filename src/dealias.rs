//! Dealiasing kernels.
//!
//! Both kernels zero exactly the coefficients marked in the dealiasing mask
//! and are interchangeable; the choice is made once from the `dealiasing_kernel`
//! parameter.

use {
    crate::setofvar::SetOfVariables,
    log::debug,
    ndarray::{Array3, Array4, ArrayView3, ArrayViewMut3, ArrayViewMut4, Axis, Zip},
    num_complex::Complex64,
    rayon::prelude::*,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    /// Sweep over the whole mask
    Sweep,
    /// Loop over the precomputed masked indices
    Indexed,
}

impl Default for KernelKind {
    fn default() -> Self {
        KernelKind::Sweep
    }
}

/// One or more equally shaped spectral arrays
pub trait SpectralArrays {
    /// Mutable view with the variables along the first axis
    fn stack_mut(&mut self) -> ArrayViewMut4<Complex64>;
}

impl SpectralArrays for Array3<Complex64> {
    fn stack_mut(&mut self) -> ArrayViewMut4<Complex64> {
        self.view_mut().insert_axis(Axis(0))
    }
}

impl<'a> SpectralArrays for ArrayViewMut3<'a, Complex64> {
    fn stack_mut(&mut self) -> ArrayViewMut4<Complex64> {
        self.view_mut().insert_axis(Axis(0))
    }
}

impl SpectralArrays for Array4<Complex64> {
    fn stack_mut(&mut self) -> ArrayViewMut4<Complex64> {
        self.view_mut()
    }
}

impl SpectralArrays for SetOfVariables<Complex64> {
    fn stack_mut(&mut self) -> ArrayViewMut4<Complex64> {
        self.data.view_mut()
    }
}

pub trait DealiasKernel: Send + Sync {
    fn kind(&self) -> KernelKind;

    /// Zeroes the masked coefficients of every variable of `stack`.
    fn apply(&self, stack: ArrayViewMut4<Complex64>);
}

/// Builds the kernel `kind` for the mask `where_dealiased` (1 = removed).
pub fn kernel(kind: KernelKind, where_dealiased: ArrayView3<u8>) -> Box<dyn DealiasKernel> {
    match kind {
        KernelKind::Sweep => Box::new(Sweep {
            mask: where_dealiased.to_owned(),
        }),
        KernelKind::Indexed => {
            let indices = where_dealiased
                .indexed_iter()
                .filter(|(_, &w)| w != 0)
                .map(|((i0, i1, i2), _)| [i0, i1, i2])
                .collect::<Vec<_>>();

            debug!(
                "indexed dealiasing: {} of {} coefficients masked",
                indices.len(),
                where_dealiased.len()
            );

            Box::new(Indexed {
                shape: where_dealiased.dim(),
                indices,
            })
        }
    }
}

pub struct Sweep {
    mask: Array3<u8>,
}

impl DealiasKernel for Sweep {
    fn kind(&self) -> KernelKind {
        KernelKind::Sweep
    }

    fn apply(&self, mut stack: ArrayViewMut4<Complex64>) {
        stack
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut var| {
                Zip::from(&mut var).and(&self.mask).par_for_each(|c, &w| {
                    if w != 0 {
                        *c = Complex64::new(0.0, 0.0);
                    }
                })
            });
    }
}

pub struct Indexed {
    shape: (usize, usize, usize),
    indices: Vec<[usize; 3]>,
}

impl DealiasKernel for Indexed {
    fn kind(&self) -> KernelKind {
        KernelKind::Indexed
    }

    fn apply(&self, mut stack: ArrayViewMut4<Complex64>) {
        for mut var in stack.outer_iter_mut() {
            assert_eq!(var.dim(), self.shape);
            for &ik in &self.indices {
                var[ik] = Complex64::new(0.0, 0.0);
            }
        }
    }
}
