//! Run configuration
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via `apply_overrides`)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! Tags stay as strings until `resolve`, so a bad tag is reported as a
//! configuration error before any file is touched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decompose::{DecomposerConfig, ResidualPolicy};
use crate::error::{DecompError, Result};
use crate::grid::{DomainExtent, GridShape, MemoryOrder};
use crate::io::ArrayFormat;
use crate::wavenumber::WavenumberMode;

/// Top-level configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub grid: GridConfig,
    pub io: IoConfig,
    pub transform: TransformConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Samples per axis (Nx, Ny, Nz)
    pub shape: [usize; 3],
    /// Physical box lengths (Lx, Ly, Lz)
    pub box_size: [f64; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            shape: [256, 256, 256],
            box_size: [200.0, 200.0, 200.0],
        }
    }
}

/// File names for the three Cartesian components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFiles {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl ComponentFiles {
    fn with_suffix(suffix: &str) -> Self {
        Self {
            x: format!("psix{}.npy", suffix),
            y: format!("psiy{}.npy", suffix),
            z: format!("psiz{}.npy", suffix),
        }
    }

    fn under(&self, dir: &Path) -> [PathBuf; 3] {
        [dir.join(&self.x), dir.join(&self.y), dir.join(&self.z)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `np_binary` or `u_binary`
    pub format: String,
    /// `float32` or `float64`; only read for `u_binary`
    pub precision: String,
    /// `C` or `F`
    pub order: String,
    pub inputs: ComponentFiles,
    pub curl_free: ComponentFiles,
    pub div_free: ComponentFiles,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            format: "np_binary".to_string(),
            precision: "float32".to_string(),
            order: "C".to_string(),
            inputs: ComponentFiles::with_suffix(""),
            curl_free: ComponentFiles::with_suffix("_curlfree"),
            div_free: ComponentFiles::with_suffix("_divfree"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// `normalized` (unit-spacing bins) or `physical` (2π/L scaling)
    pub wavenumbers: String,
    /// `ignore`, `warn`, or `fail`
    pub residual_policy: String,
    pub residual_tolerance: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            wavenumbers: "normalized".to_string(),
            residual_policy: "warn".to_string(),
            residual_tolerance: 1e-6,
        }
    }
}

/// CLI override arguments that can be applied to a config
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub shape: Option<[usize; 3]>,
    pub box_size: Option<[f64; 3]>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<String>,
    pub precision: Option<String>,
    pub order: Option<String>,
    pub wavenumbers: Option<String>,
    pub residual_policy: Option<String>,
    pub residual_tolerance: Option<f64>,
}

/// Typed view of a validated [`RunConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    pub shape: GridShape,
    pub extent: DomainExtent,
    pub format: ArrayFormat,
    pub decomposer: DecomposerConfig,
}

impl RunConfig {
    /// Load configuration from a TOML file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DecompError::io(path, e))?;
        toml::from_str(&text).map_err(|e| {
            DecompError::config(format!("invalid config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DecompError::config(format!("invalid config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DecompError::config(e.to_string()))
    }

    pub fn apply_overrides(&mut self, cli: &CliOverrides) {
        if let Some(shape) = cli.shape {
            self.grid.shape = shape;
        }
        if let Some(box_size) = cli.box_size {
            self.grid.box_size = box_size;
        }
        if let Some(dir) = &cli.input_dir {
            self.io.input_dir = dir.clone();
        }
        if let Some(dir) = &cli.output_dir {
            self.io.output_dir = dir.clone();
        }
        if let Some(format) = &cli.format {
            self.io.format = format.clone();
        }
        if let Some(precision) = &cli.precision {
            self.io.precision = precision.clone();
        }
        if let Some(order) = &cli.order {
            self.io.order = order.clone();
        }
        if let Some(mode) = &cli.wavenumbers {
            self.transform.wavenumbers = mode.clone();
        }
        if let Some(policy) = &cli.residual_policy {
            self.transform.residual_policy = policy.clone();
        }
        if let Some(tolerance) = cli.residual_tolerance {
            self.transform.residual_tolerance = tolerance;
        }
    }

    /// Parse every tag and check grid and extents
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let [nx, ny, nz] = self.grid.shape;
        let shape = GridShape::new(nx, ny, nz);
        shape.validate()?;

        let [lx, ly, lz] = self.grid.box_size;
        let extent = DomainExtent::new(lx, ly, lz);
        extent.validate()?;

        let format = ArrayFormat::parse(&self.io.format, &self.io.precision)?;
        let order: MemoryOrder = self.io.order.parse()?;
        let wavenumbers = WavenumberMode::parse(&self.transform.wavenumbers, extent)?;
        let residual = ResidualPolicy::parse(
            &self.transform.residual_policy,
            self.transform.residual_tolerance,
        )?;

        Ok(ResolvedConfig {
            shape,
            extent,
            format,
            decomposer: DecomposerConfig {
                order,
                wavenumbers,
                residual,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    pub fn input_paths(&self) -> [PathBuf; 3] {
        self.io.inputs.under(&self.io.input_dir)
    }

    pub fn curl_free_paths(&self) -> [PathBuf; 3] {
        self.io.curl_free.under(&self.io.output_dir)
    }

    pub fn div_free_paths(&self) -> [PathBuf; 3] {
        self.io.div_free.under(&self.io.output_dir)
    }
}
