//! Fixed-width scalar encoding and decoding at byte offsets
//!
//! Every read and write goes through a [`NumericKind`] and an [`Endian`].
//! SEG-Y structures are big-endian; raw recorder output is little-endian.

use crate::error::{Result, SegyError};
use crate::types::{Endian, NumericKind, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_traits::NumCast;

/// Result of a [`decode`] call
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// `count == 1`
    Scalar(Value),
    /// `count > 1`, in buffer order
    Sequence(Vec<Value>),
}

impl Decoded {
    /// First (or only) value
    pub fn first(&self) -> Option<Value> {
        match self {
            Decoded::Scalar(v) => Some(*v),
            Decoded::Sequence(values) => values.first().copied(),
        }
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Decoded::Scalar(v) => vec![v],
            Decoded::Sequence(values) => values,
        }
    }
}

/// Convert an IBM System/360 single precision bit pattern.
///
/// Layout is sign bit, 7-bit excess-64 base-16 exponent, 24-bit fraction:
/// `value = sign * 16^(exponent - 64) * fraction / 16^6`.
pub fn ibm_to_f64(bits: u32) -> f64 {
    if bits & 0x7fff_ffff == 0 {
        return 0.0;
    }
    let sign = if bits & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 24) & 0x7f) as i32 - 64;
    let mantissa = (bits & 0x00ff_ffff) as f64;
    sign * 16f64.powi(exponent) * (mantissa / 16_777_216.0)
}

fn check_bounds(len: usize, offset: usize, needed: usize) -> Result<()> {
    match offset.checked_add(needed) {
        Some(end) if end <= len => Ok(()),
        _ => Err(SegyError::BufferTooShort {
            offset,
            needed,
            len,
        }),
    }
}

fn get<B: ByteOrder>(src: &[u8], kind: NumericKind) -> Value {
    match kind {
        NumericKind::Int8 => Value::Int(src[0] as i8 as i64),
        NumericKind::UInt8 => Value::Int(src[0] as i64),
        NumericKind::Int16 => Value::Int(B::read_i16(src) as i64),
        NumericKind::UInt16 => Value::Int(B::read_u16(src) as i64),
        NumericKind::Int32 => Value::Int(B::read_i32(src) as i64),
        NumericKind::UInt32 => Value::Int(B::read_u32(src) as i64),
        NumericKind::Float32 => Value::Float(B::read_f32(src) as f64),
        NumericKind::Ibm32 => Value::Float(ibm_to_f64(B::read_u32(src))),
    }
}

fn int_cast<T: NumCast>(value: Value, kind: NumericKind) -> Result<T> {
    let cast = match value {
        Value::Int(v) => T::from(v),
        Value::Float(v) => T::from(v),
    };
    cast.ok_or_else(|| SegyError::ValueOutOfRange {
        kind: kind.to_string(),
        value: value.as_f64(),
    })
}

fn put<B: ByteOrder>(dst: &mut [u8], value: Value, kind: NumericKind) -> Result<()> {
    match kind {
        NumericKind::Int8 => dst[0] = int_cast::<i8>(value, kind)? as u8,
        NumericKind::UInt8 => dst[0] = int_cast::<u8>(value, kind)?,
        NumericKind::Int16 => B::write_i16(dst, int_cast(value, kind)?),
        NumericKind::UInt16 => B::write_u16(dst, int_cast(value, kind)?),
        NumericKind::Int32 => B::write_i32(dst, int_cast(value, kind)?),
        NumericKind::UInt32 => B::write_u32(dst, int_cast(value, kind)?),
        NumericKind::Float32 => B::write_f32(dst, value.as_f64() as f32),
        NumericKind::Ibm32 => {
            return Err(SegyError::UnsupportedNumericKind(
                "ibm32 values can be decoded but not encoded".to_string(),
            ))
        }
    }
    Ok(())
}

fn get_endian(src: &[u8], kind: NumericKind, endian: Endian) -> Value {
    match endian {
        Endian::Big => get::<BigEndian>(src, kind),
        Endian::Little => get::<LittleEndian>(src, kind),
    }
}

fn put_endian(dst: &mut [u8], value: Value, kind: NumericKind, endian: Endian) -> Result<()> {
    match endian {
        Endian::Big => put::<BigEndian>(dst, value, kind),
        Endian::Little => put::<LittleEndian>(dst, value, kind),
    }
}

/// Decode `count` consecutive values starting at `offset`.
///
/// Returns the decoded values and the offset just past the last byte read.
pub fn decode(
    buf: &[u8],
    offset: usize,
    kind: NumericKind,
    endian: Endian,
    count: usize,
) -> Result<(Decoded, usize)> {
    let size = kind.size_in_bytes();
    let needed = size * count;
    check_bounds(buf.len(), offset, needed)?;

    let region = &buf[offset..offset + needed];
    let decoded = if count == 1 {
        Decoded::Scalar(get_endian(region, kind, endian))
    } else {
        Decoded::Sequence(
            region
                .chunks_exact(size)
                .map(|chunk| get_endian(chunk, kind, endian))
                .collect(),
        )
    };
    Ok((decoded, offset + needed))
}

/// Decode a single value at `offset`
pub fn decode_scalar(buf: &[u8], offset: usize, kind: NumericKind, endian: Endian) -> Result<Value> {
    check_bounds(buf.len(), offset, kind.size_in_bytes())?;
    Ok(get_endian(&buf[offset..], kind, endian))
}

/// Decode `out.len()` values starting at `offset` straight into a float slice
pub fn decode_f64_into(
    buf: &[u8],
    offset: usize,
    kind: NumericKind,
    endian: Endian,
    out: &mut [f64],
) -> Result<usize> {
    let size = kind.size_in_bytes();
    let needed = size * out.len();
    check_bounds(buf.len(), offset, needed)?;

    for (slot, chunk) in out
        .iter_mut()
        .zip(buf[offset..offset + needed].chunks_exact(size))
    {
        *slot = get_endian(chunk, kind, endian).as_f64();
    }
    Ok(offset + needed)
}

/// Encode values back to back
pub fn encode(values: &[Value], kind: NumericKind, endian: Endian) -> Result<Vec<u8>> {
    let size = kind.size_in_bytes();
    let mut bytes = vec![0u8; size * values.len()];
    for (chunk, value) in bytes.chunks_exact_mut(size).zip(values.iter()) {
        put_endian(chunk, *value, kind, endian)?;
    }
    Ok(bytes)
}

/// Encode one value into `buf` at `offset`, returning the offset past it
pub fn encode_into(
    buf: &mut [u8],
    offset: usize,
    value: Value,
    kind: NumericKind,
    endian: Endian,
) -> Result<usize> {
    let size = kind.size_in_bytes();
    check_bounds(buf.len(), offset, size)?;
    put_endian(&mut buf[offset..offset + size], value, kind, endian)?;
    Ok(offset + size)
}

/// Encode a run of float samples into `buf` at `offset`
pub fn encode_f64_into<I>(
    buf: &mut [u8],
    offset: usize,
    samples: I,
    kind: NumericKind,
    endian: Endian,
) -> Result<usize>
where
    I: ExactSizeIterator<Item = f64>,
{
    let size = kind.size_in_bytes();
    let needed = size * samples.len();
    check_bounds(buf.len(), offset, needed)?;

    let region = &mut buf[offset..offset + needed];
    for (chunk, sample) in region.chunks_exact_mut(size).zip(samples) {
        let value = if kind.is_float() {
            Value::Float(sample)
        } else {
            Value::Int(sample.round() as i64)
        };
        put_endian(chunk, value, kind, endian)?;
    }
    Ok(offset + needed)
}
