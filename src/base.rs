use crate::error::Error;
use crate::functional::*;
use std::fmt::Debug;
use std::fmt::Display;
use std::ops::Deref;

/// Widest encoding allowed for an element ID.
pub const MAX_ID_WIDTH: usize = 4;
/// Widest encoding allowed for an element size.
pub const MAX_SIZE_WIDTH: usize = 8;

/// A variable-length integer RFC 8794, with the length marker masked out.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VInt64(pub u64);

impl Display for VInt64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl Debug for VInt64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VInt64").field(&self.0).finish()
    }
}

impl Deref for VInt64 {
    type Target = u64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode for VInt64 {
    fn decode(buf: &mut &[u8]) -> crate::Result<Self> {
        let (size, len) = decode_size(buf)?;
        buf.advance(len);
        match size {
            DataSize::Known(v) => Ok(VInt64(v)),
            DataSize::Unknown => Ok(VInt64(all_ones(len))),
        }
    }
}

impl Encode for VInt64 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.put_slice(&encode_size(self.0, 1)?);
        Ok(())
    }
}

/// Declared payload size of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataSize {
    /// A concrete payload length in bytes.
    Known(u64),
    /// The reserved all-ones sentinel: the payload runs until the parent ends.
    Unknown,
}

impl DataSize {
    /// The length, if known.
    pub fn known(self) -> Option<u64> {
        match self {
            DataSize::Known(v) => Some(v),
            DataSize::Unknown => None,
        }
    }
}

/// Largest value carried by `width` payload bits, i.e. the all-ones payload.
const fn all_ones(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX >> 8
    } else {
        (1u64 << (7 * width)) - 1
    }
}

/// Read the length marker from the first byte. Returns the total width in bytes.
fn marker_width(first: u8, max_width: usize) -> crate::Result<usize> {
    let width = first.leading_zeros() as usize + 1;
    if width > max_width {
        return Err(Error::InvalidVarint { max_width });
    }
    Ok(width)
}

/// Decode an element ID. The returned value keeps its length marker, as IDs are
/// conventionally written (`0x1A45DFA3` for EBML).
pub fn decode_id(buf: &[u8]) -> crate::Result<(u32, usize)> {
    let first = *buf.first().ok_or(Error::OutOfBounds)?;
    let width = marker_width(first, MAX_ID_WIDTH)?;
    let bytes = buf.get(..width).ok_or(Error::OutOfBounds)?;
    let id = bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
    Ok((id, width))
}

/// Decode an element size. The all-ones payload of any width is surfaced as
/// [`DataSize::Unknown`].
pub fn decode_size(buf: &[u8]) -> crate::Result<(DataSize, usize)> {
    let first = *buf.first().ok_or(Error::OutOfBounds)?;
    let width = marker_width(first, MAX_SIZE_WIDTH)?;
    let bytes = buf.get(..width).ok_or(Error::OutOfBounds)?;
    let masked = (first as u64) & (0xFF >> width);
    let value = bytes[1..]
        .iter()
        .fold(masked, |acc, b| (acc << 8) | *b as u64);
    if value == all_ones(width) {
        Ok((DataSize::Unknown, width))
    } else {
        Ok((DataSize::Known(value), width))
    }
}

/// Smallest width whose payload bits can carry `value` (7 bits per byte).
/// The all-ones sentinel is not excluded here; see [`size_width`].
pub const fn vint_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 { 1 } else { bits.div_ceil(7) }
}

/// Smallest width that encodes `value` as a size without colliding with the
/// unknown-size sentinel.
pub const fn size_width(value: u64) -> usize {
    let width = vint_width(value);
    if width < 8 && value == all_ones(width) {
        width + 1
    } else {
        width
    }
}

/// Encode a size in the smallest width that holds it, but never narrower than
/// `min_width`.
pub fn encode_size(value: u64, min_width: usize) -> crate::Result<Vec<u8>> {
    let width = size_width(value).max(min_width.max(1));
    if width > MAX_SIZE_WIDTH || value >= all_ones(MAX_SIZE_WIDTH) {
        return Err(Error::ValueTooLarge {
            value,
            width: MAX_SIZE_WIDTH,
        });
    }
    let mut out = value.to_be_bytes()[8 - width..].to_vec();
    out[0] |= 0x80 >> (width - 1);
    Ok(out)
}

/// The unknown-size sentinel in the given width.
pub fn unknown_size(width: usize) -> Vec<u8> {
    let width = width.clamp(1, MAX_SIZE_WIDTH);
    let mut out = all_ones(width).to_be_bytes()[8 - width..].to_vec();
    out[0] |= 0x80 >> (width - 1);
    out
}

/// Number of bytes an ID occupies on the wire.
pub const fn id_width(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Encode an element ID (marker included in the value).
pub fn encode_id<B: BufMut>(id: u32, buf: &mut B) {
    let width = id_width(id);
    buf.put_slice(&id.to_be_bytes()[4 - width..]);
}

/// Bias subtracted from the unsigned payload of a signed varint of `width` bytes.
pub const fn signed_bias(width: usize) -> i64 {
    (1i64 << (7 * width - 1)) - 1
}

/// Decode a signed varint (EBML lacing deltas).
pub fn decode_signed(buf: &[u8]) -> crate::Result<(i64, usize)> {
    let first = *buf.first().ok_or(Error::OutOfBounds)?;
    let width = marker_width(first, MAX_SIZE_WIDTH)?;
    let bytes = buf.get(..width).ok_or(Error::OutOfBounds)?;
    let masked = (first as u64) & (0xFF >> width);
    let raw = bytes[1..]
        .iter()
        .fold(masked, |acc, b| (acc << 8) | *b as u64);
    Ok((raw as i64 - signed_bias(width), width))
}

/// Encode a signed varint in the smallest width whose biased range holds `value`.
pub fn encode_signed(value: i64) -> crate::Result<Vec<u8>> {
    for width in 1..=MAX_SIZE_WIDTH {
        let bias = signed_bias(width);
        if value.unsigned_abs() <= bias as u64 {
            let raw = (value + bias) as u64;
            let mut out = raw.to_be_bytes()[8 - width..].to_vec();
            out[0] |= 0x80 >> (width - 1);
            return Ok(out);
        }
    }
    Err(Error::ValueTooLarge {
        value: value.unsigned_abs(),
        width: MAX_SIZE_WIDTH,
    })
}

/// Minimum number of bytes for an unsigned integer payload (zero takes one byte).
pub const fn uint_width(value: u64) -> usize {
    let bytes = (64 - value.leading_zeros() as usize).div_ceil(8);
    if bytes == 0 { 1 } else { bytes }
}

/// Minimum number of bytes for a two's complement signed integer payload.
pub const fn int_width(value: i64) -> usize {
    let mut width = 1;
    while width < 8 {
        let shift = 64 - 8 * width;
        if (value << shift) >> shift == value {
            return width;
        }
        width += 1;
    }
    8
}

/// Write `value` big-endian, zero padded to exactly `width` bytes.
pub fn encode_uint<B: BufMut>(value: u64, width: usize, buf: &mut B) -> crate::Result<()> {
    if !(1..=8).contains(&width) || uint_width(value) > width {
        return Err(Error::ValueTooLarge { value, width });
    }
    buf.put_slice(&value.to_be_bytes()[8 - width..]);
    Ok(())
}

/// Write `value` two's complement big-endian in exactly `width` bytes.
pub fn encode_int<B: BufMut>(value: i64, width: usize, buf: &mut B) -> crate::Result<()> {
    if !(1..=8).contains(&width) || int_width(value) > width {
        return Err(Error::ValueTooLarge {
            value: value.unsigned_abs(),
            width,
        });
    }
    buf.put_slice(&value.to_be_bytes()[8 - width..]);
    Ok(())
}

/// Read a big-endian unsigned integer of up to 8 bytes. Empty payloads are zero.
pub fn decode_uint(buf: &[u8]) -> Option<u64> {
    if buf.len() > 8 {
        return None;
    }
    Some(buf.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

/// Read a big-endian two's complement integer of up to 8 bytes.
pub fn decode_int(buf: &[u8]) -> Option<i64> {
    let raw = decode_uint(buf)?;
    if buf.is_empty() {
        return Some(0);
    }
    let shift = 64 - 8 * buf.len() as u32;
    Some(((raw << shift) as i64) >> shift)
}

/// EBML element header, consisting of an ID and a size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    /// EBML ID of the element, marker included.
    pub id: u32,
    /// Size of the element's data, excluding the header itself.
    pub size: DataSize,
    /// Bytes taken by the header on the wire.
    pub len: usize,
}

impl Decode for Header {
    fn decode(buf: &mut &[u8]) -> crate::Result<Self> {
        let (id, id_len) = decode_id(buf)?;
        let (size, size_len) = decode_size(&buf[id_len..])?;
        buf.advance(id_len + size_len);
        Ok(Self {
            id,
            size,
            len: id_len + size_len,
        })
    }
}

impl Encode for Header {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        encode_id(self.id, buf);
        match self.size {
            DataSize::Known(v) => buf.put_slice(&encode_size(v, 1)?),
            DataSize::Unknown => buf.put_slice(&unknown_size(MAX_SIZE_WIDTH)),
        }
        Ok(())
    }
}
