//! helmholtz: CLI tool for splitting a gridded vector field into curl-free
//! and divergence-free parts

use anyhow::{Context, Result};
use clap::Parser;
use helmholtz_decomp::{run, CliOverrides, RunConfig, RunOptions};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "helmholtz")]
#[command(about = "Helmholtz decomposition of a 3D vector field sampled on a periodic grid")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid samples per axis
    #[arg(long, num_args = 3, value_names = ["NX", "NY", "NZ"])]
    grid: Option<Vec<usize>>,

    /// Physical box lengths
    #[arg(long, num_args = 3, value_names = ["LX", "LY", "LZ"])]
    box_size: Option<Vec<f64>>,

    /// Directory holding the input components
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for the six output components
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// File format (np_binary, u_binary)
    #[arg(long)]
    format: Option<String>,

    /// Raw binary precision (float32, float64)
    #[arg(long)]
    precision: Option<String>,

    /// Flat array ordering (C, F)
    #[arg(long)]
    order: Option<String>,

    /// Wavenumber scaling (normalized, physical)
    #[arg(long)]
    wavenumbers: Option<String>,

    /// Handling of the imaginary residual (ignore, warn, fail)
    #[arg(long)]
    residual_policy: Option<String>,

    /// Tolerance for the imaginary residual
    #[arg(long)]
    residual_tolerance: Option<f64>,

    /// Write a JSON quality report (divergence, curl, reconstruction error)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn triple<T: Copy>(values: Option<Vec<T>>) -> Option<[T; 3]> {
    values.and_then(|v| <[T; 3]>::try_from(v).ok())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => RunConfig::default(),
    };

    config.apply_overrides(&CliOverrides {
        shape: triple(args.grid),
        box_size: triple(args.box_size),
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        format: args.format,
        precision: args.precision,
        order: args.order,
        wavenumbers: args.wavenumbers,
        residual_policy: args.residual_policy,
        residual_tolerance: args.residual_tolerance,
    });

    if args.print_config {
        config.validate().context("Invalid configuration")?;
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let options = RunOptions {
        with_report: args.report.is_some(),
    };
    let summary = run(&config, options).context("Decomposition failed")?;

    for path in &summary.written {
        info!("Wrote {:?}", path);
    }

    if let (Some(path), Some(report)) = (&args.report, &summary.report) {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report file: {:?}", path))?;
        info!(
            "Report: max div(div-free)={:.3e}, max curl(curl-free)={:.3e}, reconstruction error={:.3e}",
            report.max_divergence_div_free, report.max_curl_curl_free, report.max_reconstruction_error
        );
    }

    Ok(())
}
