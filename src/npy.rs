//! NumPy `.npy` reader/writer
//!
//! Only floating-point arrays are supported. Files are read into a flat
//! buffer in C (row-major) logical order regardless of the stored layout;
//! [`NpyArray::flat`] re-flattens multi-dimensional arrays in either order.
//! Files are written as version 1.0, little-endian float64, 1D, and like
//! `np.save` a `.npy` suffix is appended when the path lacks one.
//!
//! Layout:
//! - 6-byte magic `\x93NUMPY`
//! - major, minor version (u8 each)
//! - header length (u16 LE for v1, u32 LE for v2/v3)
//! - ASCII dict header padded with spaces, ending in `\n`
//! - raw element data

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::debug;

use crate::error::{DecompError, Result};
use crate::grid::MemoryOrder;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Preamble (magic + version + u16 length) plus header must be a multiple of this
const HEADER_ALIGN: usize = 64;

/// Element type found in a `.npy` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    F32 { big_endian: bool },
    F64 { big_endian: bool },
}

impl NpyDtype {
    fn parse(descr: &str) -> Option<Self> {
        let (big_endian, code) = match descr.as_bytes().first()? {
            b'<' | b'=' | b'|' => (false, &descr[1..]),
            b'>' => (true, &descr[1..]),
            _ => (false, descr),
        };
        match code {
            "f4" => Some(NpyDtype::F32 { big_endian }),
            "f8" => Some(NpyDtype::F64 { big_endian }),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            NpyDtype::F32 { .. } => 4,
            NpyDtype::F64 { .. } => 8,
        }
    }
}

/// Parsed header dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub dtype: NpyDtype,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Product of the shape, `None` on overflow
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }
}

/// A decoded array: shape as stored, data flattened in C order
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub header: NpyHeader,
    pub data: Vec<f64>,
}

impl NpyArray {
    /// Flatten in `order`. A 1D array is returned as stored; a
    /// multi-dimensional one is read in `order` over its own shape, so
    /// reshaping the result with the same order gives the stored array back.
    pub fn flat(self, order: MemoryOrder) -> Result<Vec<f64>> {
        if order == MemoryOrder::C || self.header.shape.len() <= 1 {
            return Ok(self.data);
        }
        let found = self.data.len();
        let stored = ArrayD::from_shape_vec(IxDyn(&self.header.shape), self.data).map_err(|_| {
            DecompError::ShapeMismatch {
                expected: self.header.element_count().unwrap_or(usize::MAX),
                found,
            }
        })?;
        Ok(stored.t().iter().copied().collect())
    }
}

/// Path that `np.save` would write to: `.npy` is appended unless already present
pub fn npy_path(path: &Path) -> PathBuf {
    if path.as_os_str().to_string_lossy().ends_with(".npy") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".npy");
        PathBuf::from(name)
    }
}

/// Read a `.npy` file
pub fn read_npy(path: &Path) -> Result<NpyArray> {
    let file = File::open(path).map_err(|e| DecompError::io(path, e))?;
    let array = read_npy_from(&mut BufReader::new(file), path)?;
    debug!(
        "Read {:?}: dtype={:?} shape={:?} fortran_order={}",
        path, array.header.dtype, array.header.shape, array.header.fortran_order
    );
    Ok(array)
}

/// Decode a `.npy` stream; `path` is only used in error messages
pub fn read_npy_from<R: Read>(reader: &mut R, path: &Path) -> Result<NpyArray> {
    let header = read_header(reader, path)?;
    let count = header.element_count().ok_or_else(|| {
        DecompError::format(path, format!("shape {:?} is too large", header.shape))
    })?;
    let needed = count.checked_mul(header.dtype.size()).ok_or_else(|| {
        DecompError::format(path, format!("shape {:?} is too large", header.shape))
    })?;

    // Never allocate more than the stream actually holds
    let mut bytes = Vec::new();
    reader
        .take(needed as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| DecompError::io(path, e))?;
    if bytes.len() < needed {
        return Err(DecompError::format(
            path,
            format!(
                "data section shorter than {} elements ({} of {} bytes)",
                count,
                bytes.len(),
                needed
            ),
        ));
    }

    let data = match header.dtype {
        NpyDtype::F32 { big_endian } => {
            let mut buf = vec![0f32; count];
            if big_endian {
                BigEndian::read_f32_into(&bytes, &mut buf);
            } else {
                LittleEndian::read_f32_into(&bytes, &mut buf);
            }
            buf.into_iter().map(f64::from).collect()
        }
        NpyDtype::F64 { big_endian } => {
            let mut buf = vec![0f64; count];
            if big_endian {
                BigEndian::read_f64_into(&bytes, &mut buf);
            } else {
                LittleEndian::read_f64_into(&bytes, &mut buf);
            }
            buf
        }
    };

    let data = if header.fortran_order && header.shape.len() > 1 {
        let stored = ArrayD::from_shape_vec(IxDyn(&header.shape).f(), data)
            .map_err(|e| DecompError::format(path, e.to_string()))?;
        stored.iter().copied().collect()
    } else {
        data
    };

    Ok(NpyArray { header, data })
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<NpyHeader> {
    let mut magic = [0u8; 6];
    reader
        .read_exact(&mut magic)
        .map_err(|_| DecompError::format(path, "file too short for .npy magic"))?;
    if &magic != MAGIC {
        return Err(DecompError::format(path, "missing .npy magic string"));
    }

    let major = reader.read_u8().map_err(|e| DecompError::io(path, e))?;
    let _minor = reader.read_u8().map_err(|e| DecompError::io(path, e))?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>().map(usize::from),
        2 | 3 => reader.read_u32::<LittleEndian>().map(|v| v as usize),
        v => {
            return Err(DecompError::format(path, format!("unsupported .npy version {}", v)));
        }
    }
    .map_err(|e| DecompError::io(path, e))?;

    let mut raw = vec![0u8; header_len];
    reader
        .read_exact(&mut raw)
        .map_err(|_| DecompError::format(path, "truncated .npy header"))?;
    let text = String::from_utf8_lossy(&raw);

    parse_header(&text).map_err(|message| DecompError::format(path, message))
}

/// Parse the Python dict literal, e.g.
/// `{'descr': '<f8', 'fortran_order': False, 'shape': (4, 4, 4), }`
fn parse_header(text: &str) -> std::result::Result<NpyHeader, String> {
    let descr = dict_value(text, "descr").ok_or("header has no 'descr'")?;
    let descr = descr
        .trim_start_matches(['\'', '"'])
        .split(['\'', '"'])
        .next()
        .unwrap_or_default();
    let dtype = NpyDtype::parse(descr)
        .ok_or_else(|| format!("unsupported dtype '{}': expected f4 or f8", descr))?;

    let fortran = dict_value(text, "fortran_order").ok_or("header has no 'fortran_order'")?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err(format!("bad fortran_order value in header: {}", fortran));
    };

    let shape = dict_value(text, "shape").ok_or("header has no 'shape'")?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| format!("bad shape tuple in header: {}", shape))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("bad shape entry in header: {}", e))?;

    Ok(NpyHeader {
        dtype,
        fortran_order,
        shape,
    })
}

/// Text following `'key':` in the header, left-trimmed
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    ["'", "\""].iter().find_map(|q| {
        let pattern = format!("{q}{key}{q}");
        let start = text.find(&pattern)? + pattern.len();
        let rest = text[start..].trim_start().strip_prefix(':')?;
        Some(rest.trim_start())
    })
}

/// Write a flat buffer as a 1D little-endian float64 `.npy` file.
/// Returns the path actually written (see [`npy_path`]).
pub fn write_npy(path: &Path, data: &[f64]) -> Result<PathBuf> {
    let path = npy_path(path);
    let file = File::create(&path).map_err(|e| DecompError::io(&path, e))?;
    let mut writer = BufWriter::new(file);
    write_npy_to(&mut writer, data)
        .and_then(|_| writer.flush())
        .map_err(|e| DecompError::io(&path, e))?;
    debug!("Wrote {} float64 values to {:?}", data.len(), path);
    Ok(path)
}

pub fn write_npy_to<W: Write>(writer: &mut W, data: &[f64]) -> std::io::Result<()> {
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        data.len()
    );
    // magic(6) + version(2) + length(2) + header + '\n'
    let preamble = MAGIC.len() + 4;
    let padding = (HEADER_ALIGN - (preamble + header.len() + 1) % HEADER_ALIGN) % HEADER_ALIGN;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    writer.write_all(MAGIC)?;
    writer.write_u8(1)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(header.as_bytes())?;
    for &v in data {
        writer.write_f64::<LittleEndian>(v)?;
    }
    Ok(())
}
