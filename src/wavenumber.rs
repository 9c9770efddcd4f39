//! Discrete Fourier frequency bins and the wavevector grid

use std::f64::consts::PI;
use std::str::FromStr;

use ndarray::Array3;
use serde::Serialize;

use crate::error::{DecompError, Result};
use crate::grid::{DomainExtent, GridShape};

/// Sample frequencies for an `n`-point DFT with spacing `d`.
///
/// Same layout as NumPy's `fftfreq`: `[0, 1, ..., ceil(n/2)-1, -floor(n/2), ..., -1] / (n*d)`.
pub fn fftfreq(n: usize, d: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * d);
    let positive = (n + 1) / 2;
    (0..n)
        .map(|i| {
            let m = if i < positive {
                i as f64
            } else {
                i as f64 - n as f64
            };
            m * scale
        })
        .collect()
}

/// How wavenumbers are scaled when building the wavevector grid
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub enum WavenumberMode {
    /// Unit-spacing bins in cycles per sample, range [-0.5, 0.5)
    #[default]
    Normalized,
    /// Angular wavenumbers 2π·m/L_a from the physical box lengths
    Physical(DomainExtent),
}

impl WavenumberMode {
    /// Parse a mode tag; `physical` binds the given extents
    pub fn parse(tag: &str, extent: DomainExtent) -> Result<Self> {
        match tag.parse::<WavenumberKind>()? {
            WavenumberKind::Normalized => Ok(WavenumberMode::Normalized),
            WavenumberKind::Physical => Ok(WavenumberMode::Physical(extent)),
        }
    }
}

/// Tag-only form of [`WavenumberMode`], as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavenumberKind {
    Normalized,
    Physical,
}

impl FromStr for WavenumberKind {
    type Err = DecompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "normalized" | "normalised" | "unit" => Ok(WavenumberKind::Normalized),
            "physical" => Ok(WavenumberKind::Physical),
            _ => Err(DecompError::config(format!(
                "unknown wavenumber mode '{}'. Use: normalized or physical",
                s
            ))),
        }
    }
}

/// Per-axis wavenumbers, broadcast over the other two axes on use
#[derive(Debug, Clone, PartialEq)]
pub struct WaveVectorGrid {
    pub kx: Vec<f64>,
    pub ky: Vec<f64>,
    pub kz: Vec<f64>,
}

impl WaveVectorGrid {
    pub fn new(shape: &GridShape, mode: WavenumberMode) -> Self {
        match mode {
            WavenumberMode::Normalized => Self {
                kx: fftfreq(shape.nx, 1.0),
                ky: fftfreq(shape.ny, 1.0),
                kz: fftfreq(shape.nz, 1.0),
            },
            WavenumberMode::Physical(extent) => {
                let [dx, dy, dz] = extent.cell_size(shape);
                let angular = |n: usize, d: f64| -> Vec<f64> {
                    fftfreq(n, d).into_iter().map(|k| 2.0 * PI * k).collect()
                };
                Self {
                    kx: angular(shape.nx, dx),
                    ky: angular(shape.ny, dy),
                    kz: angular(shape.nz, dz),
                }
            }
        }
    }

    /// Angular wavenumbers for spectral differentiation.
    ///
    /// Nyquist bins of even-length axes are zeroed since their derivative
    /// has no real-valued representation.
    pub fn derivative(shape: &GridShape, mode: WavenumberMode) -> Self {
        let mut grid = Self::new(shape, mode);
        if mode == WavenumberMode::Normalized {
            for axis in [&mut grid.kx, &mut grid.ky, &mut grid.kz] {
                axis.iter_mut().for_each(|k| *k *= 2.0 * PI);
            }
        }
        for axis in [&mut grid.kx, &mut grid.ky, &mut grid.kz] {
            let n = axis.len();
            if n >= 2 && n % 2 == 0 {
                axis[n / 2] = 0.0;
            }
        }
        grid
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.kx.len(), self.ky.len(), self.kz.len())
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [self.kx[i], self.ky[j], self.kz[k]]
    }

    /// |k|² at every grid point, with the zero-frequency entry set to 1
    pub fn k_squared(&self) -> Array3<f64> {
        let mut k2 = Array3::from_shape_fn(self.shape().dims(), |(i, j, k)| {
            let [kx, ky, kz] = self.at(i, j, k);
            kx * kx + ky * ky + kz * kz
        });
        // The projection numerator is exactly zero here, so any finite value works
        if let Some(dc) = k2.get_mut([0, 0, 0]) {
            *dc = 1.0;
        }
        k2
    }
}
