//! helmholtz-decomp: Helmholtz decomposition of gridded 3D vector fields
//!
//! This crate provides:
//! - Spectral splitting of a periodic vector field into curl-free and
//!   divergence-free parts
//! - NumPy `.npy` and raw binary array I/O
//! - TOML/CLI run configuration and a load → decompose → write driver
//! - Spectral divergence/curl diagnostics for checking the result
//!
//! Wavenumbers default to unit-spacing FFT bins (cycles per sample), which
//! is only consistent with physical derivatives when the grid spacing is the
//! same along every axis. Physical scaling is available as an opt-in.

pub mod config;
pub mod decompose;
pub mod diagnostics;
pub mod error;
pub mod fft;
pub mod grid;
pub mod io;
pub mod npy;
pub mod pipeline;
pub mod wavenumber;

pub use config::{CliOverrides, ResolvedConfig, RunConfig};
pub use decompose::{ArrayParts, Decomposer, DecomposerConfig, HelmholtzParts, ResidualPolicy};
pub use diagnostics::DecompositionReport;
pub use error::{DecompError, Result};
pub use grid::{DomainExtent, GridShape, MemoryOrder, VectorField};
pub use io::{ArrayFormat, Precision};
pub use pipeline::{run, RunOptions, RunSummary};
pub use wavenumber::{fftfreq, WaveVectorGrid, WavenumberMode};

/// Decompose `field` on `shape` with default settings (C order, normalized bins)
pub fn decompose(shape: GridShape, field: &VectorField) -> Result<HelmholtzParts> {
    Decomposer::default().decompose(shape, field)
}
