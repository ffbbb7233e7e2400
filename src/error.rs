use thiserror::Error;

/// Errors raised by the operator layer. All of them are fatal for the
/// computation that triggered them and are never retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters, FFT backend or decomposition.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A global index exceeds the declared extent of its axis.
    #[error("Index {index} out of range along axis {axis} (extent {extent})")]
    IndexOutOfRange {
        axis: usize,
        index: isize,
        extent: usize,
    },

    /// A code path that is deliberately not supported.
    #[error("Unimplemented case: {0}")]
    Unimplemented(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A restart file with a bad header or inconsistent contents.
    #[error("Invalid restart file: {0}")]
    Format(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn out_of_range(axis: usize, index: isize, extent: usize) -> Self {
        Self::IndexOutOfRange {
            axis,
            index,
            extent,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
