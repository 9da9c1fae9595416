use bytes::Bytes;

use crate::block::Block;
use crate::element::Element;
use crate::error::Error;
use crate::schema::ElementType;

/// A Matroska encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// the frame payload, opaque to this crate
    pub data: Bytes,
    /// whether the frame is a keyframe
    pub is_keyframe: bool,
    /// whether the frame is invisible (mostly for subtitle tracks)
    pub is_invisible: bool,
    /// whether the frame is discardable (for video tracks, e.g. non-reference frames)
    pub is_discardable: bool,
    /// track number the frame belongs to
    pub track_number: u64,
    /// timestamp of the frame, in TimecodeScale units (the same timescale as the Cluster timestamp)
    pub timestamp: i64,
}

impl Frame {
    /// A visible frame.
    pub fn new(track_number: u64, timestamp: i64, is_keyframe: bool, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            is_keyframe,
            is_invisible: false,
            is_discardable: false,
            track_number,
            timestamp,
        }
    }
}

/// A block in a Cluster, either a SimpleBlock or a BlockGroup.
///
/// This is a convenience enum to allow handling both types of blocks uniformly:
/// often we just want to iterate over all blocks in a cluster, regardless of type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterBlock<'a> {
    /// A SimpleBlock
    Simple(&'a Element),
    /// A BlockGroup
    Group(&'a Element),
}

impl<'a> ClusterBlock<'a> {
    fn from_element(e: &'a Element) -> Option<Self> {
        match e.ty {
            ElementType::SimpleBlock => Some(ClusterBlock::Simple(e)),
            ElementType::BlockGroup => Some(ClusterBlock::Group(e)),
            _ => None,
        }
    }

    /// Decode the block payload.
    pub fn block(&self) -> crate::Result<Block> {
        let payload = match self {
            ClusterBlock::Simple(e) => e.as_bytes(),
            ClusterBlock::Group(g) => g.child(ElementType::Block).and_then(Element::as_bytes),
        };
        Block::parse(payload.ok_or(Error::StructuralViolation(ElementType::Block))?)
    }

    /// The block's frames, stamped with absolute timestamps.
    pub fn frames(&self, cluster_ts: u64) -> crate::Result<Vec<Frame>> {
        let block = self.block()?;
        let (is_keyframe, is_discardable) = match self {
            ClusterBlock::Simple(_) => (block.keyframe, block.discardable),
            // A BlockGroup is a keyframe iff it references no other block.
            ClusterBlock::Group(g) => (g.child(ElementType::ReferenceBlock).is_none(), false),
        };
        let timestamp = i64::try_from(cluster_ts)
            .ok()
            .and_then(|ts| ts.checked_add(block.timecode as i64))
            .ok_or(Error::TimecodeOverflow {
                timecode: block.timecode as i64,
                cluster: cluster_ts,
            })?;
        Ok(block
            .frames
            .into_iter()
            .map(|data| Frame {
                data,
                is_keyframe,
                is_invisible: block.invisible,
                is_discardable,
                track_number: block.track,
                timestamp,
            })
            .collect())
    }
}

/// Read-only view over a parsed Cluster element.
#[derive(Debug, Clone, Copy)]
pub struct ClusterView<'a> {
    element: &'a Element,
}

impl<'a> ClusterView<'a> {
    /// View a Cluster element.
    pub fn new(element: &'a Element) -> crate::Result<Self> {
        if element.ty != ElementType::Cluster {
            return Err(Error::StructuralViolation(ElementType::Cluster));
        }
        Ok(Self { element })
    }

    /// The underlying element.
    pub fn element(&self) -> &'a Element {
        self.element
    }

    /// Base timecode; a missing Timecode reads as 0.
    pub fn timecode(&self) -> u64 {
        self.element.child_uint(ElementType::Timecode).unwrap_or(0)
    }

    /// Size of the previous Cluster, when recorded.
    pub fn prev_size(&self) -> Option<u64> {
        self.element.child_uint(ElementType::PrevSize)
    }

    /// SimpleBlock and BlockGroup children, in stream order.
    pub fn blocks(&self) -> impl Iterator<Item = ClusterBlock<'a>> + use<'a> {
        self.element
            .children()
            .iter()
            .filter_map(ClusterBlock::from_element)
    }

    /// frames in the cluster.
    pub fn frames(&self) -> impl Iterator<Item = crate::Result<Frame>> + use<'a> {
        let ts = self.timecode();
        self.blocks().flat_map(move |b| match b.frames(ts) {
            Ok(frames) => frames.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    }
}
