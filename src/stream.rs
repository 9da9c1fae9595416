//! Streaming muxing: Clusters go out as soon as they close, indexes trail.

use bytes::BufMut;
use log::{debug, info};

use crate::base::{encode_id, unknown_size, MAX_SIZE_WIDTH};
use crate::cluster::{AssembledCluster, ClusterAssembler};
use crate::frame::Frame;
use crate::index::{CueIndex, Placement, SeekEntry, SeekIndex};
use crate::io::ByteSink;
use crate::mux::{ebml_header, info_element, MuxerConfig};
use crate::schema::ElementType;
use crate::track::{tracks_element, Track};

/// Muxer writing to a sink addressed by a monotonically increasing position.
///
/// The Segment is written with an unknown size. Info and Tracks are written up
/// front, Clusters as the assembler closes them, and [`StreamingMuxer::finish`]
/// appends the Cues followed by the SeekHead. Since both indexes come after
/// everything they point at, their positions are final when recorded.
pub struct StreamingMuxer<S: ByteSink> {
    sink: S,
    config: MuxerConfig,
    assembler: ClusterAssembler,
    /// Sink position of the first byte of the Segment payload.
    segment_data: u64,
    seek: SeekIndex,
    cues: CueIndex,
    clusters: u64,
}

impl<S: ByteSink> StreamingMuxer<S> {
    /// Write the headers and get ready for frames.
    pub fn new(mut sink: S, config: MuxerConfig, tracks: Vec<Track>) -> crate::Result<Self> {
        let tracks_element = tracks_element(&tracks)?;
        let info = info_element(&config);

        ebml_header(config.doc_type).write_to(&mut sink)?;
        let mut segment_header = Vec::with_capacity(4 + MAX_SIZE_WIDTH);
        encode_id(ElementType::Segment.id(), &mut segment_header);
        segment_header.put_slice(&unknown_size(MAX_SIZE_WIDTH));
        sink.write(&segment_header)?;
        let segment_data = sink.position();

        let mut seek = SeekIndex::new(ElementType::SeekHead, Placement::Trailing, 0);
        seek.push(SeekEntry { target: ElementType::Info }, info.encoded_len());
        seek.push(SeekEntry { target: ElementType::Tracks }, tracks_element.encoded_len());
        info.write_to(&mut sink)?;
        tracks_element.write_to(&mut sink)?;
        let cues = CueIndex::new(ElementType::Cues, Placement::Trailing, sink.position() - segment_data);

        Ok(Self {
            assembler: config.assembler(&tracks),
            sink,
            config,
            segment_data,
            seek,
            cues,
            clusters: 0,
        })
    }

    /// Current position relative to the Segment payload.
    pub fn segment_position(&self) -> u64 {
        self.sink.position() - self.segment_data
    }

    /// Add the next frame, writing out any Cluster it closes.
    pub fn push(&mut self, frame: Frame) -> crate::Result<()> {
        if let Some(cluster) = self.assembler.push(frame)? {
            self.write_cluster(cluster)?;
        }
        Ok(())
    }

    fn write_cluster(&mut self, cluster: AssembledCluster) -> crate::Result<()> {
        debug!(
            "Writing Cluster {} at segment position {}",
            self.clusters,
            self.segment_position()
        );
        match cluster.cue {
            Some(cue) => self.cues.push(cue, cluster.encoded_len),
            None => self.cues.advance(cluster.encoded_len),
        }
        self.seek.advance(cluster.encoded_len);
        cluster.element.write_to(&mut self.sink)?;
        self.clusters += 1;
        Ok(())
    }

    /// Flush the last Cluster, write the trailing indexes and give back the sink.
    pub fn finish(mut self) -> crate::Result<S> {
        if let Some(cluster) = self.assembler.finish()? {
            self.write_cluster(cluster)?;
        }
        if self.config.write_cues && !self.cues.is_empty() {
            let cues = self.cues.build()?;
            self.seek.push(SeekEntry { target: ElementType::Cues }, cues.encoded_len());
            cues.write_to(&mut self.sink)?;
        }
        self.seek.build()?.write_to(&mut self.sink)?;
        info!(
            "Finished stream with {} clusters, {}B",
            self.clusters,
            self.sink.position()
        );
        Ok(self.sink)
    }
}
