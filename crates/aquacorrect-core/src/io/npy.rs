//! Minimal reader/writer for the NumPy `.npy` v1.0 format.
//!
//! Intermediate images, distance maps and fitted parameters are exchanged as
//! `.npy` files so they stay readable by the wider survey tool-chain. Only
//! C-ordered little-endian `u8`, `u16`, `f32` and `f64` payloads are
//! supported.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use num_traits::{NumCast, ToPrimitive};

use crate::error::{CorrectError, Result};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
/// magic (6) + version (2) + header length (2)
const NPY_PREAMBLE_LEN: usize = 10;
const NPY_HEADER_ALIGN: usize = 64;

/// Element type stored in an `.npy` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NpyDtype {
    U8,
    U16,
    F32,
    F64,
}

impl NpyDtype {
    pub fn descr(self) -> &'static str {
        match self {
            Self::U8 => "|u1",
            Self::U16 => "<u2",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }

    fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "|u1" | "<u1" | "u1" => Some(Self::U8),
            "<u2" => Some(Self::U16),
            "<f4" => Some(Self::F32),
            "<f8" => Some(Self::F64),
            _ => None,
        }
    }
}

/// Scalar types that can be written to and read from `.npy` files.
pub trait NpyElement: Copy + NumCast + ToPrimitive {
    const DTYPE: NpyDtype;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()>;
}

impl NpyElement for u8 {
    const DTYPE: NpyDtype = NpyDtype::U8;
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self)
    }
}

impl NpyElement for u16 {
    const DTYPE: NpyDtype = NpyDtype::U16;
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(self)
    }
}

impl NpyElement for f32 {
    const DTYPE: NpyDtype = NpyDtype::F32;
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f32::<LittleEndian>(self)
    }
}

impl NpyElement for f64 {
    const DTYPE: NpyDtype = NpyDtype::F64;
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }
}

/// Parsed `.npy` header.
#[derive(Clone, Debug, PartialEq)]
pub struct NpyHeader {
    pub dtype: NpyDtype,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

/// Write an array of any dimensionality as a C-ordered `.npy` file.
pub fn write_npy<T, S, D>(path: &Path, array: &ArrayBase<S, D>) -> Result<()>
where
    T: NpyElement,
    S: Data<Elem = T>,
    D: Dimension,
{
    let header = build_header(T::DTYPE, array.shape());
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[1u8, 0u8])?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(header.as_bytes())?;
    // `iter()` walks in logical (row-major) order regardless of memory layout.
    for &value in array.iter() {
        value.write_le(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read an `.npy` file, converting its elements to `T`.
///
/// Any supported stored dtype is accepted; values that cannot be represented
/// in `T` (e.g. 300.0 into `u8`) are reported as errors.
pub fn read_npy<T: NpyElement>(path: &Path) -> Result<ArrayD<T>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader, path)?;

    if header.fortran_order {
        return Err(npy_error(path, "Fortran-ordered arrays are not supported"));
    }

    let count: usize = header.shape.iter().product();
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = match header.dtype {
            NpyDtype::U8 => reader.read_u8()? as f64,
            NpyDtype::U16 => reader.read_u16::<LittleEndian>()? as f64,
            NpyDtype::F32 => reader.read_f32::<LittleEndian>()? as f64,
            NpyDtype::F64 => reader.read_f64::<LittleEndian>()?,
        };
        let value = <T as NumCast>::from(raw).ok_or_else(|| {
            npy_error(
                path,
                &format!("value {raw} does not fit in {}", T::DTYPE.descr()),
            )
        })?;
        values.push(value);
    }

    Ok(ArrayD::from_shape_vec(IxDyn(&header.shape), values)?)
}

/// Read only the header of an `.npy` file.
pub fn read_npy_header(path: &Path) -> Result<NpyHeader> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_header(&mut reader, path)
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<NpyHeader> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != NPY_MAGIC {
        return Err(npy_error(path, "missing \\x93NUMPY magic"));
    }

    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        v => return Err(npy_error(path, &format!("unsupported format version {v}"))),
    };

    let mut buf = vec![0u8; header_len];
    reader.read_exact(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);
    parse_header(&text).ok_or_else(|| npy_error(path, &format!("malformed header {text:?}")))
}

fn parse_header(text: &str) -> Option<NpyHeader> {
    let descr_rest = dict_value(text, "descr")?;
    let descr = quoted(descr_rest)?;
    let dtype = NpyDtype::from_descr(descr)?;

    let fortran_order = dict_value(text, "fortran_order")?.starts_with("True");

    let shape_rest = dict_value(text, "shape")?.strip_prefix('(')?;
    let shape_str = &shape_rest[..shape_rest.find(')')?];
    let shape = shape_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()?;

    Some(NpyHeader {
        dtype,
        fortran_order,
        shape,
    })
}

/// Text following `'key':` in a Python dict literal, leading spaces trimmed.
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    let start = text.find(&pattern)? + pattern.len();
    Some(text[start..].trim_start())
}

fn quoted(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('\'')?;
    Some(&inner[..inner.find('\'')?])
}

fn build_header(dtype: NpyDtype, shape: &[usize]) -> String {
    let shape_str = match shape {
        [] => "()".to_string(),
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        dtype.descr(),
        shape_str
    );
    // Total preamble + header must be a multiple of 64, newline-terminated.
    let unpadded = NPY_PREAMBLE_LEN + header.len() + 1;
    let padding = (NPY_HEADER_ALIGN - unpadded % NPY_HEADER_ALIGN) % NPY_HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

fn npy_error(path: &Path, reason: &str) -> CorrectError {
    CorrectError::Npy {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
