//! Offset indexes: SeekHead and Cues.
//!
//! Both store Segment-relative byte positions of elements that follow them, so
//! the width of each stored position feeds back into the positions themselves.
//! [`OffsetIndex`] resolves this by growing position widths until a full scan
//! finds every entry wide enough for its final value.

use log::{debug, trace};

use crate::base::{vint_width, MAX_SIZE_WIDTH};
use crate::element::Element;
use crate::error::Error;
use crate::schema::ElementType;

/// One entry of an offset index.
pub trait IndexEntry {
    /// Type of the leaf that stores the position.
    const POSITION: ElementType;

    /// Build the entry element around its position leaf.
    fn to_element(&self, position: Element) -> Element;
}

/// A SeekHead entry pointing at a top-level element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekEntry {
    /// The element the entry locates.
    pub target: ElementType,
}

impl IndexEntry for SeekEntry {
    const POSITION: ElementType = ElementType::SeekPosition;

    fn to_element(&self, position: Element) -> Element {
        let id = self.target.id();
        let width = crate::base::id_width(id);
        let id_bytes = id.to_be_bytes()[4 - width..].to_vec();
        Element::master(
            ElementType::Seek,
            vec![Element::binary(ElementType::SeekId, id_bytes), position],
        )
    }
}

/// A CuePoint entry pointing at a Cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueEntry {
    /// Absolute timecode of the cued block, in TimecodeScale units.
    pub timecode: u64,
    /// Track of the cued block.
    pub track: u64,
    /// 1-based number of the block inside its Cluster.
    pub block_number: Option<u64>,
}

impl IndexEntry for CueEntry {
    const POSITION: ElementType = ElementType::CueClusterPosition;

    fn to_element(&self, position: Element) -> Element {
        let mut positions = vec![Element::uint(ElementType::CueTrack, self.track), position];
        if let Some(n) = self.block_number {
            positions.push(Element::uint(ElementType::CueBlockNumber, n));
        }
        Element::master(
            ElementType::CuePoint,
            vec![
                Element::uint(ElementType::CueTime, self.timecode),
                Element::master(ElementType::CueTrackPositions, positions),
            ],
        )
    }
}

/// Where the index sits relative to the elements it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The index precedes its targets: every position includes the index's own size.
    Leading,
    /// The index follows its targets: positions are final as pushed.
    Trailing,
}

#[derive(Debug, Clone)]
struct Slot<E> {
    entry: E,
    data_offset: u64,
    width: usize,
}

/// Builder for a SeekHead or Cues element with self-consistent positions.
///
/// Entries must be pushed in the order their targets are emitted. Each entry
/// is recorded at the running data offset, which starts at the base given to
/// [`OffsetIndex::new`] and moves forward by the length of every target.
#[derive(Debug, Clone)]
pub struct OffsetIndex<E: IndexEntry> {
    kind: ElementType,
    placement: Placement,
    slots: Vec<Slot<E>>,
    cursor: u64,
    len: Option<u64>,
}

/// The SeekHead builder.
pub type SeekIndex = OffsetIndex<SeekEntry>;
/// The Cues builder.
pub type CueIndex = OffsetIndex<CueEntry>;

impl<E: IndexEntry> OffsetIndex<E> {
    /// An empty index of type `kind` whose first target sits `base` bytes after
    /// the index (leading) or after the Segment payload start (trailing).
    pub fn new(kind: ElementType, placement: Placement, base: u64) -> Self {
        Self {
            kind,
            placement,
            slots: Vec::new(),
            cursor: base,
            len: None,
        }
    }

    /// Record an entry for a target of `target_len` bytes at the running offset.
    pub fn push(&mut self, entry: E, target_len: u64) {
        self.slots.push(Slot {
            entry,
            data_offset: self.cursor,
            width: 0,
        });
        self.cursor += target_len;
        self.len = None;
    }

    /// Move the running offset past a target that gets no entry.
    pub fn advance(&mut self, len: u64) {
        self.cursor += len;
    }

    /// Record an entry at the running offset without moving it.
    pub fn mark(&mut self, entry: E) {
        self.push(entry, 0);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no entry was pushed.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Encoded length of the index, once stabilized.
    pub fn encoded_len(&self) -> Option<u64> {
        self.len
    }

    /// Assigned position widths, in entry order.
    pub fn widths(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.width).collect()
    }

    /// Final positions, in entry order. Only meaningful once stabilized.
    pub fn positions(&self) -> Vec<u64> {
        let len = self.len.unwrap_or(0);
        self.slots.iter().map(|s| self.resolve(s, len)).collect()
    }

    fn resolve(&self, slot: &Slot<E>, index_len: u64) -> u64 {
        match self.placement {
            Placement::Leading => slot.data_offset + index_len,
            Placement::Trailing => slot.data_offset,
        }
    }

    /// Encoded length with the current widths. Position values do not matter
    /// here since every position leaf is pinned to its width.
    fn measure(&self) -> u64 {
        let children = self
            .slots
            .iter()
            .map(|s| s.entry.to_element(Element::uint_pinned(E::POSITION, 0, s.width)))
            .collect();
        Element::master(self.kind, children).encoded_len()
    }

    /// Run the fixed-point width resolution and return the index length.
    ///
    /// Widths start at the minimum for each entry's data offset alone and only
    /// ever grow, one byte at a time. Running it again yields the same result.
    pub fn stabilize(&mut self) -> crate::Result<u64> {
        for slot in &mut self.slots {
            slot.width = vint_width(slot.data_offset);
        }
        let mut len = self.measure();
        let mut rounds = 0usize;
        'scan: loop {
            rounds += 1;
            for i in 0..self.slots.len() {
                let slot = &self.slots[i];
                let required = vint_width(self.resolve(slot, len));
                if required > MAX_SIZE_WIDTH {
                    return Err(Error::ValueTooLarge {
                        value: self.resolve(slot, len),
                        width: MAX_SIZE_WIDTH,
                    });
                }
                if required > slot.width {
                    self.slots[i].width += 1;
                    len = self.measure();
                    trace!(
                        "{} entry {i} grows to {} bytes, index now {len}B",
                        self.kind.name(),
                        self.slots[i].width
                    );
                    continue 'scan;
                }
                if required < slot.width {
                    return Err(Error::IndexWidthShrink {
                        assigned: slot.width,
                        required,
                    });
                }
            }
            break;
        }
        debug!(
            "{} with {} entries stable at {len}B after {rounds} scans",
            self.kind.name(),
            self.slots.len()
        );
        self.len = Some(len);
        Ok(len)
    }

    /// Emit the index element, stabilizing first if needed.
    pub fn build(&mut self) -> crate::Result<Element> {
        let len = match self.len {
            Some(len) => len,
            None => self.stabilize()?,
        };
        let mut children = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let position = Element::uint_pinned(E::POSITION, self.resolve(slot, len), slot.width);
            let actual = position.payload_len() as usize;
            if actual != slot.width {
                return Err(Error::WidthMismatch {
                    expected: slot.width,
                    actual,
                });
            }
            children.push(slot.entry.to_element(position));
        }
        let index = Element::master(self.kind, children);
        let actual = index.encoded_len();
        if actual != len {
            return Err(Error::IndexSizeMismatch {
                element: self.kind,
                expected: len,
                actual,
            });
        }
        Ok(index)
    }
}
