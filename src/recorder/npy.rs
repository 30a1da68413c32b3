//! Minimal NumPy `.npy` (format 1.0) reader and writer
//!
//! Only the two layouts the recorder produces are supported: `|i1` matrices and `<f8`
//! vectors, both C order.

use super::RecorderError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Array description from an `.npy` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Product of the shape, `None` if it does not fit in `usize`
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |count, &dim| count.checked_mul(dim))
    }

    fn render(&self) -> String {
        let shape = match self.shape.as_slice() {
            [n] => format!("({},)", n),
            dims => format!(
                "({})",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            self.descr,
            if self.fortran_order { "True" } else { "False" },
            shape
        )
    }

    fn parse(text: &str) -> Result<Self, RecorderError> {
        let descr = quoted_value(text, "descr")
            .ok_or_else(|| RecorderError::Format("header has no descr".into()))?;

        let fortran_order = match raw_value(text, "fortran_order") {
            Some(v) if v.starts_with("True") => true,
            Some(v) if v.starts_with("False") => false,
            _ => return Err(RecorderError::Format("header has no fortran_order".into())),
        };

        let shape_text = raw_value(text, "shape")
            .and_then(|v| v.strip_prefix('('))
            .and_then(|v| v.split(')').next())
            .ok_or_else(|| RecorderError::Format("header has no shape".into()))?;
        let shape = shape_text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| RecorderError::Format(format!("bad shape entry '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            descr: descr.to_string(),
            fortran_order,
            shape,
        })
    }
}

/// Text after `'key':`, leading whitespace removed
fn raw_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = text.find(&pattern)? + pattern.len();
    Some(text[start..].trim_start())
}

fn quoted_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let value = raw_value(text, key)?.strip_prefix('\'')?;
    value.split('\'').next()
}

pub fn write_header<W: Write>(writer: &mut W, header: &NpyHeader) -> Result<(), RecorderError> {
    let mut dict = header.render();
    // magic + version + length field + dict + newline, padded to the alignment
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    let length = u16::try_from(dict.len())
        .map_err(|_| RecorderError::Format("header too long".into()))?;
    writer.write_all(MAGIC)?;
    writer.write_u8(1)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(length)?;
    writer.write_all(dict.as_bytes())?;
    Ok(())
}

/// Read exactly the payload the header describes, without trusting it for allocation
fn read_payload<R: Read>(
    reader: &mut R,
    header: &NpyHeader,
    item_size: usize,
) -> Result<Vec<u8>, RecorderError> {
    let expected = header
        .element_count()
        .and_then(|count| count.checked_mul(item_size))
        .ok_or_else(|| {
            RecorderError::Format(format!("shape {:?} is too large", header.shape))
        })?;

    let mut data = Vec::new();
    reader.by_ref().take(expected as u64).read_to_end(&mut data)?;
    if data.len() != expected {
        return Err(RecorderError::Format(format!(
            "shape {:?} needs {} bytes of data, file has {}",
            header.shape,
            expected,
            data.len()
        )));
    }
    Ok(data)
}

pub fn read_header<R: Read>(reader: &mut R) -> Result<NpyHeader, RecorderError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(RecorderError::Format("not an .npy file".into()));
    }

    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;
    let length = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        v => return Err(RecorderError::Format(format!("unsupported .npy version {}", v))),
    };

    let mut dict = vec![0u8; length];
    reader.read_exact(&mut dict)?;
    let text = String::from_utf8_lossy(&dict);
    NpyHeader::parse(&text)
}

/// Write a `rows x cols` matrix of small integers as `|i1`
pub fn write_i8_matrix<W: Write>(
    writer: &mut W,
    rows: usize,
    cols: usize,
    data: &[u8],
) -> Result<(), RecorderError> {
    if data.len() != rows * cols {
        return Err(RecorderError::Format(format!(
            "{} values do not fill a {}x{} matrix",
            data.len(),
            rows,
            cols
        )));
    }
    let header = NpyHeader {
        descr: "|i1".to_string(),
        fortran_order: false,
        shape: vec![rows, cols],
    };
    write_header(writer, &header)?;
    writer.write_all(data)?;
    Ok(())
}

/// Read an `|i1` or `|u1` matrix; returns (rows, cols, data)
pub fn read_i8_matrix<R: Read>(reader: &mut R) -> Result<(usize, usize, Vec<u8>), RecorderError> {
    let header = read_header(reader)?;
    if header.descr != "|i1" && header.descr != "|u1" {
        return Err(RecorderError::Format(format!(
            "expected 8-bit integers, found '{}'",
            header.descr
        )));
    }
    if header.fortran_order {
        return Err(RecorderError::Format("Fortran order not supported".into()));
    }
    let (rows, cols) = match header.shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        [n] => (1, *n),
        other => {
            return Err(RecorderError::Format(format!(
                "expected a matrix, found shape {:?}",
                other
            )))
        }
    };

    let data = read_payload(reader, &header, 1)?;
    Ok((rows, cols, data))
}

/// Write a vector as `<f8`
pub fn write_f64<W: Write>(writer: &mut W, samples: &[f64]) -> Result<(), RecorderError> {
    let header = NpyHeader {
        descr: "<f8".to_string(),
        fortran_order: false,
        shape: vec![samples.len()],
    };
    write_header(writer, &header)?;
    for &sample in samples {
        writer.write_f64::<LittleEndian>(sample)?;
    }
    Ok(())
}

#[cfg(test)]
pub fn read_f64<R: Read>(reader: &mut R) -> Result<Vec<f64>, RecorderError> {
    use byteorder::ByteOrder;

    let header = read_header(reader)?;
    if header.descr != "<f8" {
        return Err(RecorderError::Format(format!(
            "expected little-endian f64, found '{}'",
            header.descr
        )));
    }
    let data = read_payload(reader, &header, 8)?;
    let mut samples = vec![0.0; data.len() / 8];
    LittleEndian::read_f64_into(&data, &mut samples);
    Ok(samples)
}
