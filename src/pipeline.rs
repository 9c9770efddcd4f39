//! Load → decompose → write driver

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::decompose::{Decomposer, HelmholtzParts};
use crate::diagnostics::DecompositionReport;
use crate::error::{DecompError, Result};
use crate::grid::{GridShape, VectorField};
use crate::io::ArrayFormat;
use crate::wavenumber::WavenumberMode;

/// What a completed run produced
#[derive(Debug)]
pub struct RunSummary {
    pub shape: GridShape,
    pub written: Vec<PathBuf>,
    pub imaginary_residual: f64,
    pub report: Option<DecompositionReport>,
}

/// Options that only affect what the driver reports, not the decomposition
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub with_report: bool,
}

/// Execute a full run. Outputs are only written once the decomposition has succeeded.
pub fn run(config: &RunConfig, options: RunOptions) -> Result<RunSummary> {
    let resolved = config.resolve()?;
    let shape = resolved.shape;

    if resolved.decomposer.wavenumbers == WavenumberMode::Normalized
        && !resolved.extent.is_isotropic(&shape)
    {
        let [dx, dy, dz] = resolved.extent.cell_size(&shape);
        warn!(
            "Cell sizes differ ({:.4}, {:.4}, {:.4}) but wavenumbers are normalized per sample; \
             consider wavenumbers = \"physical\"",
            dx, dy, dz
        );
    }

    info!(
        "Loading {} field ({}, order {})",
        shape, resolved.format, resolved.decomposer.order
    );
    let order = resolved.decomposer.order;
    let [px, py, pz] = config.input_paths();
    let field = VectorField::new(
        resolved.format.read(&px, order)?,
        resolved.format.read(&py, order)?,
        resolved.format.read(&pz, order)?,
    );

    let decomposer = Decomposer::new(resolved.decomposer);
    let parts = decomposer.decompose(shape, &field)?;
    info!(
        "Decomposition done, imaginary residual {:.3e}",
        parts.imaginary_residual
    );

    let report = if options.with_report {
        Some(DecompositionReport::compute(
            shape,
            &field,
            &parts,
            decomposer.config(),
        )?)
    } else {
        None
    };

    if !config.io.output_dir.as_os_str().is_empty() {
        fs::create_dir_all(&config.io.output_dir)
            .map_err(|e| DecompError::io(&config.io.output_dir, e))?;
    }
    let written = write_parts(config, &parts, resolved.format)?;
    info!("Wrote {} files", written.len());

    Ok(RunSummary {
        shape,
        written,
        imaginary_residual: parts.imaginary_residual,
        report,
    })
}

fn write_parts(
    config: &RunConfig,
    parts: &HelmholtzParts,
    format: ArrayFormat,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(6);
    let targets = config
        .div_free_paths()
        .into_iter()
        .zip(parts.div_free.components())
        .chain(
            config
                .curl_free_paths()
                .into_iter()
                .zip(parts.curl_free.components()),
        );
    for (path, data) in targets {
        written.push(format.write(&path, data)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemoryOrder;
    use crate::io::Precision;
    use crate::npy;
    use std::f64::consts::PI;
    use std::path::Path;

    /// Ψ = ∇φ + solenoidal part, both resolved on a 4^3 grid
    fn mixed_field(shape: &GridShape) -> (VectorField, VectorField) {
        let w = 2.0 * PI / 4.0;
        let gradient = VectorField::from_fn(shape, MemoryOrder::C, |i, _, k| {
            [w * (w * i as f64).cos(), 0.0, -w * (w * k as f64).sin()]
        });
        let solenoidal = VectorField::from_fn(shape, MemoryOrder::C, |i, j, _| {
            [(w * j as f64).sin(), (w * i as f64).cos(), 0.3]
        });
        (gradient, solenoidal)
    }

    fn sum(a: &VectorField, b: &VectorField) -> VectorField {
        let add = |x: &[f64], y: &[f64]| -> Vec<f64> { x.iter().zip(y).map(|(p, q)| p + q).collect() };
        VectorField::new(add(&a.x, &b.x), add(&a.y, &b.y), add(&a.z, &b.z))
    }

    fn write_inputs(config: &RunConfig, field: &VectorField, format: ArrayFormat) {
        for (path, data) in config.input_paths().iter().zip(field.components()) {
            format.write(path, data).unwrap();
        }
    }

    fn config_in(dir: &Path) -> RunConfig {
        let mut config = RunConfig::default();
        config.grid.shape = [4, 4, 4];
        config.io.input_dir = dir.to_path_buf();
        config.io.output_dir = dir.join("out");
        config
    }

    #[test]
    fn test_npy_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shape = GridShape::cubic(4);
        let (gradient, solenoidal) = mixed_field(&shape);
        write_inputs(&config, &sum(&gradient, &solenoidal), ArrayFormat::Tagged);

        let summary = run(&config, RunOptions { with_report: true }).unwrap();
        assert_eq!(summary.written.len(), 6);
        assert!(summary.written.iter().all(|p| p.exists()));

        let [cx, cy, cz] = config.curl_free_paths();
        let curl = [cx, cy, cz].map(|p| npy::read_npy(&p).unwrap().data);
        for (got, want) in curl.iter().zip(gradient.components()) {
            assert!(got.iter().zip(want).all(|(a, b)| (a - b).abs() < 1e-12));
        }

        let [dx, dy, dz] = config.div_free_paths();
        let div = [dx, dy, dz].map(|p| npy::read_npy(&p).unwrap().data);
        for (got, want) in div.iter().zip(solenoidal.components()) {
            assert!(got.iter().zip(want).all(|(a, b)| (a - b).abs() < 1e-12));
        }

        let report = summary.report.unwrap();
        assert!(report.max_divergence_div_free < 1e-10);
        assert!(report.max_curl_curl_free < 1e-10);
    }

    #[test]
    fn test_raw_f32_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.io.format = "u_binary".to_string();
        config.io.precision = "float32".to_string();
        let format = ArrayFormat::Raw(Precision::F32);

        let shape = GridShape::cubic(4);
        let (gradient, solenoidal) = mixed_field(&shape);
        let psi = sum(&gradient, &solenoidal);
        write_inputs(&config, &psi, format);

        run(&config, RunOptions::default()).unwrap();

        let curl: Vec<Vec<f64>> = config
            .curl_free_paths()
            .iter()
            .map(|p| format.read(p, MemoryOrder::C).unwrap())
            .collect();
        let div: Vec<Vec<f64>> = config
            .div_free_paths()
            .iter()
            .map(|p| format.read(p, MemoryOrder::C).unwrap())
            .collect();
        for a in 0..3 {
            assert_eq!(curl[a].len(), 64);
            for idx in 0..64 {
                let original = psi.components()[a][idx];
                let rebuilt = curl[a][idx] + div[a][idx];
                assert!((rebuilt - original).abs() <= 1e-6 * original.abs().max(1.0));
            }
        }
    }

    /// A C-ordered 3D `.npy` file, as `np.save` writes an (nx, ny, nz) array
    fn write_npy_3d(path: &Path, shape: &GridShape, f: impl Fn(usize, usize, usize) -> f64) {
        let header = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}, {}), }}\n",
            shape.nx, shape.ny, shape.nz
        );
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for i in 0..shape.nx {
            for j in 0..shape.ny {
                for k in 0..shape.nz {
                    bytes.extend_from_slice(&f(i, j, k).to_le_bytes());
                }
            }
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_3d_npy_input_with_fortran_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.grid.shape = [2, 3, 4];
        config.io.order = "F".to_string();
        let shape = GridShape::new(2, 3, 4);

        let value = |axis: usize, i: usize, j: usize, k: usize| {
            (100 * i + 10 * j + k) as f64 + 1000.0 * axis as f64
        };
        for (axis, path) in config.input_paths().iter().enumerate() {
            write_npy_3d(path, &shape, |i, j, k| value(axis, i, j, k));
        }

        run(&config, RunOptions::default()).unwrap();

        let curl = config.curl_free_paths().map(|p| npy::read_npy(&p).unwrap().data);
        let div = config.div_free_paths().map(|p| npy::read_npy(&p).unwrap().data);
        for axis in 0..3 {
            for i in 0..2 {
                for j in 0..3 {
                    for k in 0..4 {
                        // Outputs are flat in F order
                        let idx = MemoryOrder::F.flat_index(&shape, i, j, k);
                        let rebuilt = curl[axis][idx] + div[axis][idx];
                        let want = value(axis, i, j, k);
                        assert!((rebuilt - want).abs() < 1e-9, "({i},{j},{k}): {rebuilt} vs {want}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_tagged_output_gets_npy_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.io.div_free.z = "psiz_divfree.pyy".to_string();
        let shape = GridShape::cubic(4);
        let (gradient, solenoidal) = mixed_field(&shape);
        write_inputs(&config, &sum(&gradient, &solenoidal), ArrayFormat::Tagged);

        let summary = run(&config, RunOptions::default()).unwrap();
        let expected = config.io.output_dir.join("psiz_divfree.pyy.npy");
        assert!(summary.written.contains(&expected));
        assert!(expected.exists());
    }

    #[test]
    fn test_shape_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let short = VectorField::new(vec![0.0; 64], vec![0.0; 63], vec![0.0; 64]);
        write_inputs(&config, &short, ArrayFormat::Tagged);

        let err = run(&config, RunOptions::default()).unwrap_err();
        assert!(matches!(err, DecompError::ShapeMismatch { .. }));
        assert!(!config.io.output_dir.exists());
    }

    #[test]
    fn test_bad_format_aborts_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.io.format = "netcdf".to_string();

        // No input files exist, so reaching the loader would give an I/O error instead
        let err = run(&config, RunOptions::default()).unwrap_err();
        assert!(matches!(err, DecompError::Configuration(_)));
    }
}
