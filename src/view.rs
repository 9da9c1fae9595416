//! A View of a parsed Matroska file.

use crate::element::Element;
use crate::error::Error;
use crate::frame::ClusterView;
use crate::io::ByteStore;
use crate::parser::{Parser, ParserConfig};
use crate::schema::ElementType;
use crate::track::{tracks_from_element, Track};

/// Default TimecodeScale, in nanoseconds per tick.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// A SeekHead entry as read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// Raw ID of the target.
    pub id: u32,
    /// Position relative to the Segment payload.
    pub position: u64,
}

/// A CuePoint as read back, one per CueTrackPositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuePointView {
    /// Timecode, in TimecodeScale units.
    pub timecode: u64,
    /// Track number.
    pub track: u64,
    /// Cluster position relative to the Segment payload.
    pub cluster_position: u64,
    /// Block number inside the Cluster, if recorded.
    pub block_number: Option<u64>,
}

/// View of a Matroska file: the EBML header and its first Segment.
#[derive(Debug, Clone, PartialEq)]
pub struct MatroskaView {
    /// The EBML header.
    pub ebml: Element,
    /// The Segment.
    pub segment: Element,
}

impl MatroskaView {
    /// Pick the EBML header and the first Segment out of parsed root elements.
    pub fn from_elements(roots: Vec<Element>) -> crate::Result<Self> {
        let mut ebml = None;
        let mut segment = None;
        for e in roots {
            match e.ty {
                ElementType::Ebml if ebml.is_none() => ebml = Some(e),
                ElementType::Segment if segment.is_none() => segment = Some(e),
                _ => {}
            }
        }
        Ok(Self {
            ebml: ebml.ok_or(Error::StructuralViolation(ElementType::Ebml))?,
            segment: segment.ok_or(Error::StructuralViolation(ElementType::Segment))?,
        })
    }

    /// Parse a byte store and build the view.
    pub fn parse<S: ByteStore>(store: S, config: ParserConfig) -> crate::Result<Self> {
        Self::from_elements(Parser::with_config(store, config).parse()?)
    }

    /// DocType from the EBML header.
    pub fn doc_type(&self) -> Option<&str> {
        self.ebml.child_str(ElementType::DocType)
    }

    /// Nanoseconds per timecode tick.
    pub fn timecode_scale(&self) -> u64 {
        self.segment
            .path(&[ElementType::Info, ElementType::TimecodeScale])
            .and_then(Element::as_uint)
            .unwrap_or(DEFAULT_TIMECODE_SCALE)
    }

    /// Segment duration in ticks, if recorded.
    pub fn duration(&self) -> Option<f64> {
        self.segment
            .path(&[ElementType::Info, ElementType::Duration])
            .and_then(Element::as_float)
    }

    /// All tracks. Fails when the Segment has no Tracks element.
    pub fn tracks(&self) -> crate::Result<Vec<Track>> {
        tracks_from_element(self.segment.require(ElementType::Tracks)?)
    }

    /// SeekHead entries, across every SeekHead of the Segment.
    pub fn seek_entries(&self) -> Vec<SeekPoint> {
        self.segment
            .children_of(ElementType::SeekHead)
            .flat_map(|h| h.children_of(ElementType::Seek))
            .filter_map(|s| {
                let id = s.child(ElementType::SeekId)?.as_bytes()?;
                if id.is_empty() || id.len() > 4 {
                    return None;
                }
                Some(SeekPoint {
                    id: id.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32),
                    position: s.child_uint(ElementType::SeekPosition)?,
                })
            })
            .collect()
    }

    /// Cue points, in stored order.
    pub fn cue_points(&self) -> Vec<CuePointView> {
        let mut out = Vec::new();
        for point in self
            .segment
            .children_of(ElementType::Cues)
            .flat_map(|c| c.children_of(ElementType::CuePoint))
        {
            let timecode = point.child_uint(ElementType::CueTime).unwrap_or(0);
            for pos in point.children_of(ElementType::CueTrackPositions) {
                let (Some(track), Some(cluster_position)) = (
                    pos.child_uint(ElementType::CueTrack),
                    pos.child_uint(ElementType::CueClusterPosition),
                ) else {
                    continue;
                };
                out.push(CuePointView {
                    timecode,
                    track,
                    cluster_position,
                    block_number: pos.child_uint(ElementType::CueBlockNumber),
                });
            }
        }
        out
    }

    /// Clusters, in stream order.
    pub fn clusters(&self) -> impl Iterator<Item = ClusterView<'_>> + '_ {
        self.segment
            .children_of(ElementType::Cluster)
            .filter_map(|c| ClusterView::new(c).ok())
    }

    /// The top-level element starting at a Segment-relative position.
    pub fn locate(&self, position: u64) -> Option<&Element> {
        let offset = self.segment.data_offset.checked_add(position)?;
        self.segment.children().iter().find(|c| c.offset == offset)
    }
}
