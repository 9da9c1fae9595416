//! Handler for lacing and delacing operations on frame data.

use crate::Error;
use crate::base::{decode_signed, decode_size, encode_signed, encode_size, DataSize};

/// Handler for lacing and delacing operations on frame data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lacer {
    /// Xiph lacing (variable-size frames with size prefixes)
    Xiph,
    /// Fixed-size lacing (all frames have the same size)
    FixedSize,
    /// EBML lacing (variable-size frames with EBML-encoded sizes)
    Ebml,
}

impl Lacer {
    /// The lacing bits (bits 1-2 of the block flags), `None` for no lacing.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags >> 1) & 0b11 {
            0b01 => Some(Lacer::Xiph),
            0b10 => Some(Lacer::FixedSize),
            0b11 => Some(Lacer::Ebml),
            _ => None,
        }
    }

    /// The block flag bits selecting this lacing.
    pub fn flag_bits(&self) -> u8 {
        match self {
            Lacer::Xiph => 0b01 << 1,
            Lacer::FixedSize => 0b10 << 1,
            Lacer::Ebml => 0b11 << 1,
        }
    }

    /// Encode multiple frames into a single laced block
    pub fn lace(&self, frames: &[&[u8]]) -> crate::Result<Vec<u8>> {
        if frames.is_empty() {
            return Ok(vec![]);
        }
        if frames.len() > 256 {
            return Err(Error::MalformedLacingData);
        }
        let num_frames = frames.len();
        let mut output = vec![(num_frames - 1) as u8]; // Number of frames - 1
        match self {
            Lacer::Xiph => {
                for frame in &frames[..num_frames - 1] {
                    let mut size = frame.len();
                    while size >= 0xFF {
                        output.push(0xFF);
                        size -= 0xFF;
                    }
                    output.push(size as u8);
                }
            }
            Lacer::FixedSize => {
                if frames.iter().any(|f| f.len() != frames[0].len()) {
                    return Err(Error::MalformedLacingData);
                }
            }
            Lacer::Ebml => {
                if num_frames > 1 {
                    output.extend_from_slice(&encode_size(frames[0].len() as u64, 1)?);
                    for pair in frames[..num_frames - 1].windows(2) {
                        let delta = pair[1].len() as i64 - pair[0].len() as i64;
                        output.extend_from_slice(&encode_signed(delta)?);
                    }
                }
            }
        }
        for frame in frames {
            output.extend_from_slice(frame);
        }
        Ok(output)
    }

    /// Decode a laced block into individual frames
    pub fn delace<'a>(&self, data: &'a [u8]) -> crate::Result<Vec<&'a [u8]>> {
        let Some((&count, mut rest)) = data.split_first() else {
            return Ok(vec![]);
        };
        let num_frames = count as usize + 1;

        // sizes of all frames but the last
        let mut sizes = Vec::with_capacity(num_frames);
        match self {
            Lacer::Xiph => {
                while sizes.len() < num_frames - 1 {
                    let mut size = 0usize;
                    loop {
                        let (&b, tail) = rest.split_first().ok_or(Error::MalformedLacingData)?;
                        rest = tail;
                        size += b as usize;
                        if b != 0xFF {
                            break;
                        }
                    }
                    sizes.push(size);
                }
            }
            Lacer::FixedSize => {
                if rest.len() % num_frames != 0 {
                    return Err(Error::MalformedLacingData);
                }
                sizes.resize(num_frames - 1, rest.len() / num_frames);
            }
            Lacer::Ebml => {
                if num_frames > 1 {
                    let (first, len) =
                        decode_size(rest).map_err(|_| Error::MalformedLacingData)?;
                    let DataSize::Known(first) = first else {
                        return Err(Error::MalformedLacingData);
                    };
                    rest = &rest[len..];
                    let mut size = first as i64;
                    sizes.push(first as usize);
                    while sizes.len() < num_frames - 1 {
                        let (delta, len) =
                            decode_signed(rest).map_err(|_| Error::MalformedLacingData)?;
                        rest = &rest[len..];
                        size += delta;
                        if size < 0 {
                            return Err(Error::MalformedLacingData);
                        }
                        sizes.push(size as usize);
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(num_frames);
        for size in sizes {
            if size > rest.len() {
                return Err(Error::MalformedLacingData);
            }
            let (frame, tail) = rest.split_at(size);
            out.push(frame);
            rest = tail;
        }
        out.push(rest);
        Ok(out)
    }
}
