//! Array file formats
//!
//! Two on-disk layouts are supported:
//! - `Tagged`: NumPy `.npy`, precision read from the header
//! - `Raw(precision)`: headerless native-endian binary, precision from config
//!
//! Reading takes the flat-buffer ordering so that multi-dimensional `.npy`
//! inputs come back flattened the same way the decomposer will reshape them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use byteorder::{ByteOrder, NativeEndian};
use serde::Serialize;
use tracing::debug;

use crate::error::{DecompError, Result};
use crate::grid::MemoryOrder;
use crate::npy;

/// Floating-point precision of raw binary files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Precision {
    #[default]
    F32,
    F64,
}

impl Precision {
    pub fn size(&self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

impl FromStr for Precision {
    type Err = DecompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "float32" | "f32" | "single" => Ok(Precision::F32),
            "float64" | "f64" | "double" => Ok(Precision::F64),
            _ => Err(DecompError::config(format!(
                "unknown precision '{}'. Use: float32 or float64",
                s
            ))),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F32 => write!(f, "float32"),
            Precision::F64 => write!(f, "float64"),
        }
    }
}

/// Tag-only form of [`ArrayFormat`], as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Tagged,
    Raw,
}

impl FromStr for FormatKind {
    type Err = DecompError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "np_binary" | "npy" | "numpy" => Ok(FormatKind::Tagged),
            "u_binary" | "raw" | "binary" => Ok(FormatKind::Raw),
            _ => Err(DecompError::config(format!(
                "unknown file format '{}'. Use: np_binary or u_binary",
                s
            ))),
        }
    }
}

/// How field components are stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ArrayFormat {
    #[default]
    Tagged,
    Raw(Precision),
}

impl ArrayFormat {
    /// Resolve format and precision tags together; precision only matters for raw files
    pub fn parse(format: &str, precision: &str) -> Result<Self> {
        match format.parse::<FormatKind>()? {
            FormatKind::Tagged => Ok(ArrayFormat::Tagged),
            FormatKind::Raw => Ok(ArrayFormat::Raw(precision.parse()?)),
        }
    }

    /// Load one component as a flat buffer in `order`
    pub fn read(&self, path: &Path, order: MemoryOrder) -> Result<Vec<f64>> {
        match self {
            ArrayFormat::Tagged => npy::read_npy(path)?.flat(order),
            ArrayFormat::Raw(precision) => read_raw(path, *precision),
        }
    }

    /// Persist one flat component array, returning the path written
    pub fn write(&self, path: &Path, data: &[f64]) -> Result<PathBuf> {
        match self {
            ArrayFormat::Tagged => npy::write_npy(path, data),
            ArrayFormat::Raw(precision) => {
                write_raw(path, data, *precision)?;
                Ok(path.to_path_buf())
            }
        }
    }
}

impl fmt::Display for ArrayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayFormat::Tagged => write!(f, "np_binary"),
            ArrayFormat::Raw(p) => write!(f, "u_binary ({})", p),
        }
    }
}

fn read_raw(path: &Path, precision: Precision) -> Result<Vec<f64>> {
    let bytes = fs::read(path).map_err(|e| DecompError::io(path, e))?;
    let size = precision.size();
    if bytes.len() % size != 0 {
        return Err(DecompError::format(
            path,
            format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                precision
            ),
        ));
    }

    let count = bytes.len() / size;
    let data = match precision {
        Precision::F32 => {
            let mut buf = vec![0f32; count];
            NativeEndian::read_f32_into(&bytes, &mut buf);
            buf.into_iter().map(f64::from).collect()
        }
        Precision::F64 => {
            let mut buf = vec![0f64; count];
            NativeEndian::read_f64_into(&bytes, &mut buf);
            buf
        }
    };
    debug!("Read {} {} values from {:?}", count, precision, path);
    Ok(data)
}

fn write_raw(path: &Path, data: &[f64], precision: Precision) -> Result<()> {
    let mut bytes = vec![0u8; data.len() * precision.size()];
    match precision {
        Precision::F32 => {
            let narrowed: Vec<f32> = data.iter().map(|&v| v as f32).collect();
            NativeEndian::write_f32_into(&narrowed, &mut bytes);
        }
        Precision::F64 => NativeEndian::write_f64_into(data, &mut bytes),
    }
    fs::write(path, &bytes).map_err(|e| DecompError::io(path, e))?;
    debug!("Wrote {} {} values to {:?}", data.len(), precision, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_parsing() {
        assert_eq!(ArrayFormat::parse("np_binary", "bogus").unwrap(), ArrayFormat::Tagged);
        assert_eq!(
            ArrayFormat::parse("u_binary", "float64").unwrap(),
            ArrayFormat::Raw(Precision::F64)
        );
        assert!(matches!(
            ArrayFormat::parse("hdf5", "float32"),
            Err(DecompError::Configuration(_))
        ));
        assert!(matches!(
            ArrayFormat::parse("u_binary", "float16"),
            Err(DecompError::Configuration(_))
        ));
    }

    #[test]
    fn test_raw_f32_write_casts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psix.dat");
        let format = ArrayFormat::Raw(Precision::F32);

        format.write(&path, &[0.1, 2.5, -4.0]).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 12);

        let back = format.read(&path, MemoryOrder::C).unwrap();
        assert_eq!(back, vec![0.1f32 as f64, 2.5, -4.0]);
    }

    #[test]
    fn test_raw_f64_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psiy.dat");
        let format = ArrayFormat::Raw(Precision::F64);
        let data = vec![0.1, 1e-300, -7.25];

        format.write(&path, &data).unwrap();
        assert_eq!(format.read(&path, MemoryOrder::C).unwrap(), data);
    }

    #[test]
    fn test_raw_rejects_partial_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dat");
        fs::write(&path, [0u8; 10]).unwrap();

        let err = ArrayFormat::Raw(Precision::F64).read(&path, MemoryOrder::C).unwrap_err();
        assert!(matches!(err, DecompError::Format { .. }));
        // The same bytes are a valid f32 file only if the length divides by 4
        assert!(ArrayFormat::Raw(Precision::F32).read(&path, MemoryOrder::C).is_err());
    }

    #[test]
    fn test_raw_ignores_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psiz.dat");
        let format = ArrayFormat::Raw(Precision::F64);
        let data = vec![1.0, 2.0, 3.0, 4.0];

        let written = format.write(&path, &data).unwrap();
        assert_eq!(written, path);
        assert_eq!(format.read(&path, MemoryOrder::F).unwrap(), data);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArrayFormat::Tagged
            .read(&dir.path().join("absent.npy"), MemoryOrder::C)
            .unwrap_err();
        assert!(matches!(err, DecompError::Io { .. }));
    }
}
