//! SimpleBlock and Block payloads.

use bytes::Bytes;

use crate::base::VInt64;
use crate::element::Element;
use crate::error::Error;
use crate::functional::*;
use crate::lacer::Lacer;
use crate::schema::ElementType;

const FLAG_KEYFRAME: u8 = 0x80;
const FLAG_INVISIBLE: u8 = 0x08;
const FLAG_DISCARDABLE: u8 = 0x01;

/// Decoded payload of a SimpleBlock or Block element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Track number.
    pub track: u64,
    /// Timecode relative to the enclosing Cluster.
    pub timecode: i16,
    /// Keyframe flag. Only carried on the wire by SimpleBlock.
    pub keyframe: bool,
    /// Invisible flag.
    pub invisible: bool,
    /// Discardable flag. Only carried on the wire by SimpleBlock.
    pub discardable: bool,
    /// Lacing mode, `None` for a single frame.
    pub lacing: Option<Lacer>,
    /// Frame payloads, sharing the parsed buffer.
    pub frames: Vec<Bytes>,
}

impl Block {
    /// A single-frame block without lacing.
    pub fn single(track: u64, timecode: i16, keyframe: bool, frame: impl Into<Bytes>) -> Self {
        Self {
            track,
            timecode,
            keyframe,
            invisible: false,
            discardable: false,
            lacing: None,
            frames: vec![frame.into()],
        }
    }

    /// Decode a block payload. Frames are slices of `data`, not copies.
    pub fn parse(data: &Bytes) -> crate::Result<Self> {
        let buf = &mut &data[..];
        let track = VInt64::decode(buf).map_err(|_| Error::MalformedBlock)?;
        let timecode = i16::decode(buf).map_err(|_| Error::MalformedBlock)?;
        let flags = u8::decode(buf).map_err(|_| Error::MalformedBlock)?;
        let body = *buf;

        let lacing = Lacer::from_flags(flags);
        let frames = match lacing {
            None => vec![data.slice_ref(body)],
            Some(lacer) => lacer
                .delace(body)?
                .into_iter()
                .map(|f| data.slice_ref(f))
                .collect(),
        };
        Ok(Self {
            track: *track,
            timecode,
            keyframe: flags & FLAG_KEYFRAME != 0,
            invisible: flags & FLAG_INVISIBLE != 0,
            discardable: flags & FLAG_DISCARDABLE != 0,
            lacing,
            frames,
        })
    }

    fn flags(&self, simple: bool) -> u8 {
        let mut flags = self.lacing.map_or(0, |l| l.flag_bits());
        if self.invisible {
            flags |= FLAG_INVISIBLE;
        }
        if simple && self.keyframe {
            flags |= FLAG_KEYFRAME;
        }
        if simple && self.discardable {
            flags |= FLAG_DISCARDABLE;
        }
        flags
    }

    fn encode_with<B: BufMut>(&self, simple: bool, buf: &mut B) -> crate::Result<()> {
        VInt64(self.track).encode(buf)?;
        self.timecode.encode(buf)?;
        self.flags(simple).encode(buf)?;
        match self.lacing {
            None => {
                let [frame] = &self.frames[..] else {
                    return Err(Error::MalformedBlock);
                };
                buf.put_slice(frame);
            }
            Some(lacer) => {
                let frames: Vec<&[u8]> = self.frames.iter().map(|f| &f[..]).collect();
                buf.put_slice(&lacer.lace(&frames)?);
            }
        }
        Ok(())
    }

    /// Wrap the block in a SimpleBlock element.
    pub fn to_simple_block(&self) -> crate::Result<Element> {
        let mut buf = Vec::new();
        self.encode_with(true, &mut buf)?;
        Ok(Element::binary(ElementType::SimpleBlock, buf))
    }

    /// Wrap the block in a BlockGroup, with ReferenceBlock entries for
    /// non-keyframes and an optional BlockDuration.
    pub fn to_block_group(&self, references: &[i64], duration: Option<u64>) -> crate::Result<Element> {
        let mut buf = Vec::new();
        self.encode_with(false, &mut buf)?;
        let mut children = vec![Element::binary(ElementType::Block, buf)];
        if let Some(duration) = duration {
            children.push(Element::uint(ElementType::BlockDuration, duration));
        }
        children.extend(
            references
                .iter()
                .map(|r| Element::int(ElementType::ReferenceBlock, *r)),
        );
        Ok(Element::master(ElementType::BlockGroup, children))
    }
}

impl Encode for Block {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        self.encode_with(true, buf)
    }
}
