//! Pseudo-spectral operators and the distributed-domain bookkeeping behind
//! them: FFT backends, slab decomposition, wavenumber grids, dealiasing and
//! transfers between coarse and fine spectral grids.

#[cfg(test)]
mod utils;

pub mod comm;
pub mod dealias;
pub mod decomp;
pub mod error;
pub mod fft;
pub mod operators;
pub mod parameters;
pub mod restart;
pub mod setofvar;
pub mod wavenumbers;

pub use error::{Error, Result};
