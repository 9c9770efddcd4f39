//! Spectral divergence/curl estimates and the decomposition report

use chrono::{DateTime, Utc};
use ndarray::Array3;
use num_complex::Complex64;
use serde::Serialize;

use crate::decompose::{DecomposerConfig, HelmholtzParts};
use crate::error::{DecompError, Result};
use crate::fft::Fft3d;
use crate::grid::{GridShape, VectorField};
use crate::wavenumber::{WaveVectorGrid, WavenumberMode};

const I: Complex64 = Complex64 { re: 0.0, im: 1.0 };

fn spectra(fft: &Fft3d, psi: [&Array3<f64>; 3]) -> Result<[Array3<Complex64>; 3]> {
    Ok([
        fft.forward_real(psi[0])?,
        fft.forward_real(psi[1])?,
        fft.forward_real(psi[2])?,
    ])
}

/// Shared grid of the three components; rejects empty or mismatched arrays
fn shape_of(psi: [&Array3<f64>; 3]) -> Result<GridShape> {
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
    Ok(shape)
}

/// ∇·Ψ via spectral differentiation
pub fn divergence(psi: [&Array3<f64>; 3], mode: WavenumberMode) -> Result<Array3<f64>> {
    let shape = shape_of(psi)?;
    let fft = Fft3d::new(shape);
    let waves = WaveVectorGrid::derivative(&shape, mode);
    let [sx, sy, sz] = spectra(&fft, psi)?;

    let mut div = Array3::from_shape_fn(shape.dims(), |(i, j, k)| {
        let [kx, ky, kz] = waves.at(i, j, k);
        let idx = [i, j, k];
        I * (sx[idx] * kx + sy[idx] * ky + sz[idx] * kz)
    });
    fft.inverse(&mut div)?;
    Ok(div.mapv(|c| c.re))
}

/// ∇×Ψ via spectral differentiation
pub fn curl(psi: [&Array3<f64>; 3], mode: WavenumberMode) -> Result<[Array3<f64>; 3]> {
    let shape = shape_of(psi)?;
    let fft = Fft3d::new(shape);
    let waves = WaveVectorGrid::derivative(&shape, mode);
    let [sx, sy, sz] = spectra(&fft, psi)?;

    let component = |axis: usize| -> Result<Array3<f64>> {
        let mut out = Array3::from_shape_fn(shape.dims(), |(i, j, k)| {
            let [kx, ky, kz] = waves.at(i, j, k);
            let idx = [i, j, k];
            let value = match axis {
                0 => sz[idx] * ky - sy[idx] * kz,
                1 => sx[idx] * kz - sz[idx] * kx,
                _ => sy[idx] * kx - sx[idx] * ky,
            };
            I * value
        });
        fft.inverse(&mut out)?;
        Ok(out.mapv(|c| c.re))
    };

    Ok([component(0)?, component(1)?, component(2)?])
}

fn max_abs<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().fold(0.0, |m, v| m.max(v.abs()))
}

fn rms(field: &VectorField) -> f64 {
    let n = field.x.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = field
        .components()
        .iter()
        .flat_map(|c| c.iter())
        .map(|v| v * v)
        .sum();
    (sum / n as f64).sqrt()
}

/// Quality figures for one decomposition
#[derive(Debug, Clone, Serialize)]
pub struct DecompositionReport {
    pub grid: GridShape,
    /// max |∇·Ψ_divfree|
    pub max_divergence_div_free: f64,
    /// max |∇×Ψ_curlfree| over all components
    pub max_curl_curl_free: f64,
    /// max |Ψ_curlfree + Ψ_divfree − Ψ|
    pub max_reconstruction_error: f64,
    pub imaginary_residual: f64,
    pub rms_input: f64,
    pub rms_curl_free: f64,
    pub rms_div_free: f64,
    pub generated_at: DateTime<Utc>,
}

impl DecompositionReport {
    pub fn compute(
        shape: GridShape,
        input: &VectorField,
        parts: &HelmholtzParts,
        config: &DecomposerConfig,
    ) -> Result<Self> {
        shape.validate()?;
        let order = config.order;
        let arrays = |field: &VectorField| -> Result<[Array3<f64>; 3]> {
            Ok([
                order.reshape(&shape, field.x.clone())?,
                order.reshape(&shape, field.y.clone())?,
                order.reshape(&shape, field.z.clone())?,
            ])
        };

        let [dx, dy, dz] = arrays(&parts.div_free)?;
        let div = divergence([&dx, &dy, &dz], config.wavenumbers)?;

        let [cx, cy, cz] = arrays(&parts.curl_free)?;
        let rot = curl([&cx, &cy, &cz], config.wavenumbers)?;

        let mut max_reconstruction_error = 0.0f64;
        for a in 0..3 {
            let original = input.components()[a];
            let curl_part = parts.curl_free.components()[a];
            let div_part = parts.div_free.components()[a];
            for ((o, c), d) in original.iter().zip(curl_part).zip(div_part) {
                max_reconstruction_error = max_reconstruction_error.max((c + d - o).abs());
            }
        }

        Ok(Self {
            grid: shape,
            max_divergence_div_free: max_abs(div.iter()),
            max_curl_curl_free: rot.iter().map(|c| max_abs(c.iter())).fold(0.0, f64::max),
            max_reconstruction_error,
            imaginary_residual: parts.imaginary_residual,
            rms_input: rms(input),
            rms_curl_free: rms(&parts.curl_free),
            rms_div_free: rms(&parts.div_free),
            generated_at: Utc::now(),
        })
    }
}
