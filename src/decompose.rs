//! Spectral Helmholtz decomposition
//!
//! Splits a periodic vector field Ψ into a curl-free part and a
//! divergence-free part:
//!
//! 1. FFT each component
//! 2. project the spectrum onto the wavevector: P = (k·Ψ̂) / |k|²
//! 3. curl-free component a = Re(IFFT(P·k_a))
//! 4. divergence-free component a = Ψ_a − curl-free component a
//!
//! The factor i from the spectral gradient appears in both the projection
//! numerator and the reconstruction, so it cancels and is never applied.

use std::str::FromStr;

use ndarray::Array3;
use num_complex::Complex64;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DecompError, Result};
use crate::fft::Fft3d;
use crate::grid::{GridShape, MemoryOrder, VectorField};
use crate::wavenumber::{WaveVectorGrid, WavenumberMode};

/// What to do with the imaginary part left after the inverse transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ResidualPolicy {
    /// Drop it silently
    Ignore,
    /// Log a warning when it exceeds the tolerance
    Warn(f64),
    /// Abort the decomposition when it exceeds the tolerance
    Fail(f64),
}

impl Default for ResidualPolicy {
    fn default() -> Self {
        ResidualPolicy::Warn(1e-6)
    }
}

impl ResidualPolicy {
    /// Build a policy from a tag (`ignore`, `warn`, `fail`) and tolerance
    pub fn parse(tag: &str, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(DecompError::config(format!(
                "residual tolerance must be a non-negative number, got {}",
                tolerance
            )));
        }
        match tag.parse::<ResidualKind>()? {
            ResidualKind::Ignore => Ok(ResidualPolicy::Ignore),
            ResidualKind::Warn => Ok(ResidualPolicy::Warn(tolerance)),
            ResidualKind::Fail => Ok(ResidualPolicy::Fail(tolerance)),
        }
    }

    fn check(&self, residual: f64) -> Result<()> {
        match *self {
            ResidualPolicy::Ignore => Ok(()),
            ResidualPolicy::Warn(tolerance) => {
                if residual > tolerance {
                    warn!(
                        "Imaginary residual {:.3e} after inverse FFT exceeds tolerance {:.3e}; discarding it",
                        residual, tolerance
                    );
                }
                Ok(())
            }
            ResidualPolicy::Fail(tolerance) => {
                if residual > tolerance {
                    return Err(DecompError::ImaginaryResidual { residual, tolerance });
                }
                Ok(())
            }
        }
    }
}

/// Tag-only form of [`ResidualPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    Ignore,
    Warn,
    Fail,
}

impl FromStr for ResidualKind {
    type Err = DecompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" | "off" => Ok(ResidualKind::Ignore),
            "warn" | "warning" => Ok(ResidualKind::Warn),
            "fail" | "error" => Ok(ResidualKind::Fail),
            _ => Err(DecompError::config(format!(
                "unknown residual policy '{}'. Use: ignore, warn, or fail",
                s
            ))),
        }
    }
}

/// Immutable settings for a [`Decomposer`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecomposerConfig {
    /// Ordering used to read input buffers and write output buffers
    pub order: MemoryOrder,
    pub wavenumbers: WavenumberMode,
    pub residual: ResidualPolicy,
}

/// Decomposition result as flat buffers
#[derive(Debug, Clone)]
pub struct HelmholtzParts {
    pub curl_free: VectorField,
    pub div_free: VectorField,
    /// Largest imaginary magnitude after the inverse FFT, relative to max |Ψ|
    pub imaginary_residual: f64,
}

/// Decomposition result as 3D arrays, indexed [x, y, z]
#[derive(Debug, Clone)]
pub struct ArrayParts {
    pub curl_free: [Array3<f64>; 3],
    pub div_free: [Array3<f64>; 3],
    pub imaginary_residual: f64,
}

/// Stateless Helmholtz decomposer
#[derive(Debug, Clone, Default)]
pub struct Decomposer {
    config: DecomposerConfig,
}

impl Decomposer {
    pub fn new(config: DecomposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecomposerConfig {
        &self.config
    }

    /// Decompose a field given as three flat buffers on `shape`
    pub fn decompose(&self, shape: GridShape, field: &VectorField) -> Result<HelmholtzParts> {
        shape.validate()?;
        // All three lengths must agree before any of them is compared to the grid
        for component in [&field.y, &field.z] {
            if component.len() != field.x.len() {
                return Err(DecompError::ShapeMismatch {
                    expected: field.x.len(),
                    found: component.len(),
                });
            }
        }
        shape.check_len(field.x.len())?;

        let order = self.config.order;
        let psi = [
            order.reshape(&shape, field.x.clone())?,
            order.reshape(&shape, field.y.clone())?,
            order.reshape(&shape, field.z.clone())?,
        ];

        let parts = self.decompose_arrays([&psi[0], &psi[1], &psi[2]])?;

        let [cx, cy, cz] = &parts.curl_free;
        let [dx, dy, dz] = &parts.div_free;
        Ok(HelmholtzParts {
            curl_free: VectorField::new(order.flatten(cx), order.flatten(cy), order.flatten(cz)),
            div_free: VectorField::new(order.flatten(dx), order.flatten(dy), order.flatten(dz)),
            imaginary_residual: parts.imaginary_residual,
        })
    }

    /// Decompose a field already held as three (Nx, Ny, Nz) arrays
    pub fn decompose_arrays(&self, psi: [&Array3<f64>; 3]) -> Result<ArrayParts> {
        let (nx, ny, nz) = psi[0].dim();
        let shape = GridShape::new(nx, ny, nz);
        shape.validate()?;
        for component in &psi[1..] {
            if component.dim() != psi[0].dim() {
                return Err(DecompError::ShapeMismatch {
                    expected: shape.len(),
                    found: component.len(),
                });
            }
        }

        debug!("Decomposing {} field", shape);

        let fft = Fft3d::new(shape);
        let waves = WaveVectorGrid::new(&shape, self.config.wavenumbers);
        let k2 = waves.k_squared();

        let projection = {
            let sx = fft.forward_real(psi[0])?;
            let sy = fft.forward_real(psi[1])?;
            let sz = fft.forward_real(psi[2])?;
            Array3::from_shape_fn(shape.dims(), |(i, j, k)| {
                let [kx, ky, kz] = waves.at(i, j, k);
                let idx = [i, j, k];
                (sx[idx] * kx + sy[idx] * ky + sz[idx] * kz) / k2[idx]
            })
        };

        let scale = psi
            .iter()
            .flat_map(|a| a.iter())
            .fold(0.0f64, |m, v| m.max(v.abs()));

        let mut max_imag = 0.0f64;
        let mut split = |axis: usize| -> Result<(Array3<f64>, Array3<f64>)> {
            let mut spectrum: Array3<Complex64> =
                Array3::from_shape_fn(shape.dims(), |(i, j, k)| {
                    projection[[i, j, k]] * waves.at(i, j, k)[axis]
                });
            fft.inverse(&mut spectrum)?;

            max_imag = spectrum.iter().fold(max_imag, |m, c| m.max(c.im.abs()));
            let curl = spectrum.mapv(|c| c.re);
            let div = psi[axis] - &curl;
            Ok((curl, div))
        };
        let (curl_x, div_x) = split(0)?;
        let (curl_y, div_y) = split(1)?;
        let (curl_z, div_z) = split(2)?;

        let imaginary_residual = if scale > 0.0 { max_imag / scale } else { max_imag };
        debug!("Imaginary residual after inverse FFT: {:.3e}", imaginary_residual);
        self.config.residual.check(imaginary_residual)?;

        Ok(ArrayParts {
            curl_free: [curl_x, curl_y, curl_z],
            div_free: [div_x, div_y, div_z],
            imaginary_residual,
        })
    }
}
