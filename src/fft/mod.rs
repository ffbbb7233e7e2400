//! Boundary with the FFT backends.
//!
//! Physical arrays are indexed (z, y, x). The x axis is transformed real to
//! complex so its spectral extent is nx/2 + 1. Backends are free to order
//! the spectral axes as they like (distributed transforms usually end with a
//! transposed layout); the order is published through [`DimMapping`] and the
//! operators never assume it.
//!
//! The forward transform is normalised by 1/(nx*ny*nz), the inverse is not.

mod lines;
mod sequential;
mod sequential2d;
mod slab;

pub use {sequential::Sequential3d, sequential2d::Sequential2d, slab::Slab3d};

use {
    crate::{
        comm::Communicator,
        error::{Error, Result},
    },
    log::debug,
    ndarray::{Array3, ArrayView3},
    num_complex::Complex64,
    serde::{Deserialize, Serialize},
    std::{str::FromStr, sync::Arc},
};

/// Physical axis indices
pub const AXIS_Z: usize = 0;
pub const AXIS_Y: usize = 1;
pub const AXIS_X: usize = 2;

/// Correspondence between the axes of spectral arrays and physical axes:
/// spectral axis `i` holds the wavenumbers of physical axis `self.0[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimMapping([usize; 3]);

impl DimMapping {
    pub const IDENTITY: DimMapping = DimMapping([AXIS_Z, AXIS_Y, AXIS_X]);

    pub fn new(axes: [usize; 3]) -> Result<Self> {
        let mut seen = [false; 3];
        for &a in &axes {
            if a > 2 || seen[a] {
                return Err(Error::configuration(format!(
                    "{:?} is not a permutation of the physical axes",
                    axes
                )));
            }
            seen[a] = true;
        }
        Ok(DimMapping(axes))
    }

    /// Physical axis stored along spectral axis `k_axis`
    pub fn x_axis(&self, k_axis: usize) -> usize {
        self.0[k_axis]
    }

    /// Spectral axis holding physical axis `x_axis`
    pub fn k_axis(&self, x_axis: usize) -> usize {
        self.0
            .iter()
            .position(|&a| a == x_axis)
            .unwrap_or_else(|| unreachable!("DimMapping is always a permutation"))
    }

    /// Reorders a triple given in spectral axis order into (z, y, x) order.
    pub fn to_zyx<T: Copy>(&self, k: [T; 3]) -> [T; 3] {
        let mut zyx = k;
        for (i, v) in k.iter().enumerate() {
            zyx[self.0[i]] = *v;
        }
        zyx
    }

    /// Reorders a triple given in (z, y, x) order into spectral axis order.
    pub fn to_k<T: Copy>(&self, zyx: [T; 3]) -> [T; 3] {
        [zyx[self.0[0]], zyx[self.0[1]], zyx[self.0[2]]]
    }
}

/// Capabilities the operators need from an FFT backend.
pub trait SpectralTransform: Send + Sync {
    /// Human readable backend name
    fn name(&self) -> &str;

    /// Forward transform of a local physical array (shape `shape_x_loc`).
    fn fft(&self, field: ArrayView3<f64>) -> Array3<Complex64>;

    /// Inverse transform of a local spectral array (shape `shape_k_loc`).
    fn ifft(&self, field_fft: ArrayView3<Complex64>) -> Array3<f64>;

    fn shape_x_seq(&self) -> [usize; 3];
    fn shape_x_loc(&self) -> [usize; 3];
    fn shape_k_seq(&self) -> [usize; 3];
    fn shape_k_loc(&self) -> [usize; 3];

    /// Global index of the first local physical element
    fn seq_indices_first_x(&self) -> [usize; 3];
    /// Global index of the first local spectral element
    fn seq_indices_first_k(&self) -> [usize; 3];

    fn dim_mapping(&self) -> DimMapping;
}

/// FFT methods known to the operator factory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftKind {
    /// Sequential on one rank, slab decomposition otherwise
    Default,
    Sequential,
    Slab,
}

impl FromStr for FftKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(FftKind::Default),
            "sequential" | "fft3d.with_rustfft" => Ok(FftKind::Sequential),
            "slab" | "fft3d.mpi_with_slab" => Ok(FftKind::Slab),
            _ => Err(Error::configuration(format!(
                "unknown FFT method \"{}\"",
                s
            ))),
        }
    }
}

/// Builds the backend for a physical grid (nx, ny, nz).
pub fn build(
    kind: FftKind,
    (nx, ny, nz): (usize, usize, usize),
    comm: Arc<dyn Communicator>,
) -> Result<Box<dyn SpectralTransform>> {
    let kind = match kind {
        FftKind::Default if comm.size() == 1 => FftKind::Sequential,
        FftKind::Default => FftKind::Slab,
        k => k,
    };

    debug!("building {:?} FFT for {}x{}x{}", kind, nx, ny, nz);

    match kind {
        FftKind::Sequential if comm.size() > 1 => Err(Error::configuration(format!(
            "sequential FFT requested on {} ranks",
            comm.size()
        ))),
        FftKind::Sequential => Ok(Box::new(Sequential3d::new(nx, ny, nz))),
        _ => Ok(Box::new(Slab3d::new(nx, ny, nz, comm)?)),
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::comm::SingleProcess};

    #[test]
    fn dim_mapping() {
        let mapping = DimMapping::new([AXIS_Y, AXIS_Z, AXIS_X]).unwrap();

        assert_eq!(mapping.x_axis(0), AXIS_Y);
        assert_eq!(mapping.k_axis(AXIS_Y), 0);
        assert_eq!(mapping.k_axis(AXIS_X), 2);
        assert_eq!(mapping.to_zyx([1, 2, 3]), [2, 1, 3]);
        assert_eq!(mapping.to_k(mapping.to_zyx([1, 2, 3])), [1, 2, 3]);
        assert_eq!(DimMapping::IDENTITY.to_k([4, 5, 6]), [4, 5, 6]);

        assert!(DimMapping::new([0, 0, 2]).is_err());
        assert!(DimMapping::new([0, 1, 3]).is_err());
    }

    #[test]
    fn factory() {
        let comm: Arc<dyn Communicator> = Arc::new(SingleProcess);

        let fft = build(FftKind::Default, (8, 6, 4), comm.clone()).unwrap();
        assert_eq!(fft.shape_k_seq(), [4, 6, 5]);
        assert_eq!(fft.dim_mapping(), DimMapping::IDENTITY);

        let fft = build(FftKind::Slab, (8, 6, 4), comm).unwrap();
        assert_eq!(fft.shape_k_seq(), [6, 4, 5]);

        assert!("pyfftw".parse::<FftKind>().is_err());
    }
}
