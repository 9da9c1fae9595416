//! Grouping a flat frame sequence into Clusters.

use log::{debug, warn};

use crate::block::Block;
use crate::element::Element;
use crate::error::Error;
use crate::frame::Frame;
use crate::index::CueEntry;
use crate::schema::ElementType;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A closed Cluster with its final size.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCluster {
    /// The Cluster element.
    pub element: Element,
    /// Base timecode, in TimecodeScale units.
    pub timecode: u64,
    /// Encoded length of the whole element.
    pub encoded_len: u64,
    /// Cue candidate: the first keyframe of the cue track.
    pub cue: Option<CueEntry>,
}

#[derive(Debug)]
struct OpenCluster {
    timecode: u64,
    children: Vec<Element>,
    blocks: u64,
    cue: Option<CueEntry>,
}

/// Assigns frames to Clusters of a fixed frame budget.
///
/// A Cluster starts whenever the running frame index is a multiple of the
/// budget. Its base timecode is the timestamp of its first frame and every block
/// stores its offset from that base. Each Cluster after the first records the
/// encoded length of the one before it as PrevSize.
#[derive(Debug)]
pub struct ClusterAssembler {
    frames_per_cluster: u64,
    cue_track: Option<u64>,
    frame_index: u64,
    prev: Option<(u64, u64)>,
    current: Option<OpenCluster>,
}

impl ClusterAssembler {
    /// An assembler closing a Cluster every `frames_per_cluster` frames (at least 1).
    pub fn new(frames_per_cluster: u64) -> Self {
        Self {
            frames_per_cluster: frames_per_cluster.max(1),
            cue_track: None,
            frame_index: 0,
            prev: None,
            current: None,
        }
    }

    /// Budget derived from the timescale: one second worth of ticks.
    pub fn from_timescale(timecode_scale: u64) -> Self {
        Self::new(NANOS_PER_SECOND / timecode_scale.max(1))
    }

    /// Only keyframes of this track become cue candidates. Without it, any track does.
    pub fn with_cue_track(mut self, track: u64) -> Self {
        self.cue_track = Some(track);
        self
    }

    /// The frame budget.
    pub fn frames_per_cluster(&self) -> u64 {
        self.frames_per_cluster
    }

    /// Add the next frame. Returns the Cluster this frame closed, if any.
    pub fn push(&mut self, frame: Frame) -> crate::Result<Option<AssembledCluster>> {
        let closed = if self.frame_index % self.frames_per_cluster == 0 {
            let closed = self.close()?;
            self.open(&frame)?;
            closed
        } else {
            None
        };
        self.frame_index += 1;

        let Some(cluster) = self.current.as_mut() else {
            return Err(Error::StructuralViolation(ElementType::Cluster));
        };
        let relative = frame.timestamp - cluster.timecode as i64;
        let timecode = i16::try_from(relative).map_err(|_| Error::TimecodeOverflow {
            timecode: frame.timestamp,
            cluster: cluster.timecode,
        })?;
        cluster.blocks += 1;
        if cluster.cue.is_none()
            && frame.is_keyframe
            && self.cue_track.is_none_or(|t| t == frame.track_number)
        {
            cluster.cue = Some(CueEntry {
                timecode: frame.timestamp.max(0) as u64,
                track: frame.track_number,
                block_number: Some(cluster.blocks),
            });
        }
        let block = Block {
            invisible: frame.is_invisible,
            discardable: frame.is_discardable,
            ..Block::single(frame.track_number, timecode, frame.is_keyframe, frame.data)
        };
        cluster.children.push(block.to_simple_block()?);
        Ok(closed)
    }

    /// Close the last Cluster.
    pub fn finish(&mut self) -> crate::Result<Option<AssembledCluster>> {
        self.close()
    }

    /// Assemble a whole frame sequence.
    pub fn assemble(mut self, frames: impl IntoIterator<Item = Frame>) -> crate::Result<Vec<AssembledCluster>> {
        let mut clusters = Vec::new();
        for frame in frames {
            clusters.extend(self.push(frame)?);
        }
        clusters.extend(self.finish()?);
        Ok(clusters)
    }

    fn open(&mut self, frame: &Frame) -> crate::Result<()> {
        let mut timecode = u64::try_from(frame.timestamp).map_err(|_| Error::TimecodeOverflow {
            timecode: frame.timestamp,
            cluster: 0,
        })?;
        if let Some((prev_timecode, _)) = self.prev {
            if timecode < prev_timecode {
                warn!(
                    "Frame at {timecode} precedes the previous Cluster at {prev_timecode}, keeping Cluster timecodes monotonic"
                );
                timecode = prev_timecode;
            }
        }
        let mut children = vec![Element::uint(ElementType::Timecode, timecode)];
        if let Some((_, prev_len)) = self.prev {
            children.push(Element::uint(ElementType::PrevSize, prev_len));
        }
        self.current = Some(OpenCluster {
            timecode,
            children,
            blocks: 0,
            cue: None,
        });
        Ok(())
    }

    fn close(&mut self) -> crate::Result<Option<AssembledCluster>> {
        let Some(open) = self.current.take() else {
            return Ok(None);
        };
        let element = Element::master(ElementType::Cluster, open.children);
        let encoded_len = element.encoded_len();
        debug!(
            "Closed Cluster at {} with {} blocks, {encoded_len}B",
            open.timecode, open.blocks
        );
        self.prev = Some((open.timecode, encoded_len));
        Ok(Some(AssembledCluster {
            element,
            timecode: open.timecode,
            encoded_len,
            cue: open.cue,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: i64, step: i64) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::new(1, i * step, i % 3 == 0, vec![i as u8; 10]))
            .collect()
    }

    #[test]
    fn budget_from_timescale() {
        assert_eq!(ClusterAssembler::from_timescale(1_000_000).frames_per_cluster(), 1000);
        assert_eq!(ClusterAssembler::from_timescale(NANOS_PER_SECOND * 2).frames_per_cluster(), 1);
        assert_eq!(ClusterAssembler::new(0).frames_per_cluster(), 1);
    }

    #[test]
    fn partition_and_prev_size() {
        let clusters = ClusterAssembler::new(4).assemble(frames(10, 40)).unwrap();
        assert_eq!(clusters.len(), 3);
        assert_eq!(
            clusters.iter().map(|c| c.timecode).collect::<Vec<_>>(),
            vec![0, 160, 320]
        );
        let blocks: Vec<usize> = clusters
            .iter()
            .map(|c| c.element.children_of(ElementType::SimpleBlock).count())
            .collect();
        assert_eq!(blocks, vec![4, 4, 2]);
        assert_eq!(clusters[0].element.child(ElementType::PrevSize), None);
        for pair in clusters.windows(2) {
            assert_eq!(
                pair[1].element.child_uint(ElementType::PrevSize),
                Some(pair[0].encoded_len)
            );
            assert_eq!(pair[0].encoded_len, pair[0].element.encoded_len());
        }
    }

    #[test]
    fn cue_on_first_keyframe() {
        let clusters = ClusterAssembler::new(4)
            .with_cue_track(1)
            .assemble(frames(8, 10))
            .unwrap();
        // keyframes at 0, 3, 6
        assert_eq!(
            clusters[0].cue,
            Some(CueEntry { timecode: 0, track: 1, block_number: Some(1) })
        );
        assert_eq!(
            clusters[1].cue,
            Some(CueEntry { timecode: 60, track: 1, block_number: Some(3) })
        );

        let other = ClusterAssembler::new(4)
            .with_cue_track(2)
            .assemble(frames(8, 10))
            .unwrap();
        assert!(other.iter().all(|c| c.cue.is_none()));
    }

    #[test]
    fn relative_timecode_overflow() {
        let mut assembler = ClusterAssembler::new(10);
        assembler.push(Frame::new(1, 0, true, vec![0])).unwrap();
        assert!(matches!(
            assembler.push(Frame::new(1, 40_000, false, vec![0])),
            Err(Error::TimecodeOverflow { timecode: 40_000, cluster: 0 })
        ));
    }
}
