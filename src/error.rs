//! Error taxonomy for decomposition runs
//!
//! Every variant is fatal: a run either completes or stops before writing output.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecompError {
    /// Unknown format/precision/order tag, bad extents, unparsable config file
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shape mismatch: expected {expected} elements, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("invalid grid shape ({nx}, {ny}, {nz}): every dimension must be >= 1")]
    InvalidGridShape { nx: usize, ny: usize, nz: usize },

    /// Imaginary part left after the inverse transform exceeded the configured tolerance
    #[error("imaginary residual {residual:.3e} exceeds tolerance {tolerance:.3e}")]
    ImaginaryResidual { residual: f64, tolerance: f64 },

    #[error("malformed array file {path:?}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DecompError {
    pub fn config(message: impl Into<String>) -> Self {
        DecompError::Configuration(message.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DecompError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DecompError::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecompError>;
