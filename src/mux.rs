//! Whole-file muxing.
//!
//! All Clusters are assembled and sized first, then the SeekHead and Cues are
//! stabilized against those sizes, and finally the document is emitted as EBML
//! header, SeekHead, Info, Tracks, Cues, Clusters.

use log::info;

use crate::cluster::{AssembledCluster, ClusterAssembler};
use crate::element::Element;
use crate::frame::Frame;
use crate::index::{CueIndex, Placement, SeekEntry, SeekIndex};
use crate::io::ByteSink;
use crate::schema::ElementType;
use crate::track::{tracks_element, Track, TrackKind};

/// Document type written in the EBML header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    /// `matroska`
    Matroska,
    /// `webm`
    WebM,
}

impl DocType {
    /// The DocType string.
    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Matroska => "matroska",
            DocType::WebM => "webm",
        }
    }
}

/// Muxer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxerConfig {
    /// Document type.
    pub doc_type: DocType,
    /// Nanoseconds per timecode tick.
    pub timecode_scale: u64,
    /// MuxingApp string.
    pub muxing_app: String,
    /// WritingApp string.
    pub writing_app: String,
    /// Segment title.
    pub title: Option<String>,
    /// Segment duration in timecode ticks.
    pub duration: Option<f64>,
    /// Emit Cues (and the SeekHead entry pointing at them).
    pub write_cues: bool,
    /// Cluster frame budget; derived from the timecode scale when unset.
    pub frames_per_cluster: Option<u64>,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            doc_type: DocType::Matroska,
            timecode_scale: 1_000_000,
            muxing_app: concat!("mkv-ebml-", env!("CARGO_PKG_VERSION")).to_string(),
            writing_app: concat!("mkv-ebml-", env!("CARGO_PKG_VERSION")).to_string(),
            title: None,
            duration: None,
            write_cues: true,
            frames_per_cluster: None,
        }
    }
}

impl MuxerConfig {
    /// Defaults with the `webm` document type.
    pub fn webm() -> Self {
        Self {
            doc_type: DocType::WebM,
            ..Self::default()
        }
    }

    pub(crate) fn assembler(&self, tracks: &[Track]) -> ClusterAssembler {
        let assembler = match self.frames_per_cluster {
            Some(k) => ClusterAssembler::new(k),
            None => ClusterAssembler::from_timescale(self.timecode_scale),
        };
        match cue_track(tracks) {
            Some(track) => assembler.with_cue_track(track),
            None => assembler,
        }
    }
}

/// Cue track: the first video track, else the first track.
pub fn cue_track(tracks: &[Track]) -> Option<u64> {
    tracks
        .iter()
        .find(|t| t.kind == TrackKind::Video)
        .or(tracks.first())
        .map(|t| t.number)
}

/// The EBML header for a document type.
pub fn ebml_header(doc_type: DocType) -> Element {
    use ElementType as T;
    Element::master(
        T::Ebml,
        vec![
            Element::uint(T::EbmlVersion, 1),
            Element::uint(T::EbmlReadVersion, 1),
            Element::uint(T::EbmlMaxIdLength, 4),
            Element::uint(T::EbmlMaxSizeLength, 8),
            Element::string(T::DocType, doc_type.as_str()),
            Element::uint(T::DocTypeVersion, 4),
            Element::uint(T::DocTypeReadVersion, 2),
        ],
    )
}

/// The Info element for a configuration.
pub fn info_element(config: &MuxerConfig) -> Element {
    use ElementType as T;
    let mut children = vec![Element::uint(T::TimecodeScale, config.timecode_scale)];
    if let Some(duration) = config.duration {
        children.push(Element::float(T::Duration, duration));
    }
    if let Some(title) = &config.title {
        children.push(Element::string(T::Title, title.as_str()));
    }
    children.push(Element::string(T::MuxingApp, config.muxing_app.as_str()));
    children.push(Element::string(T::WritingApp, config.writing_app.as_str()));
    Element::master(T::Info, children)
}

/// Two-pass whole-file muxer.
#[derive(Debug, Clone)]
pub struct Muxer {
    config: MuxerConfig,
    tracks: Vec<Track>,
    info: Element,
    tracks_element: Element,
}

impl Muxer {
    /// A muxer for the given tracks. Track numbers must be unique.
    pub fn new(config: MuxerConfig, tracks: Vec<Track>) -> crate::Result<Self> {
        let tracks_element = tracks_element(&tracks)?;
        Ok(Self {
            info: info_element(&config),
            config,
            tracks,
            tracks_element,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Mux time-ordered frames into `[EBML, Segment]`.
    pub fn mux(&self, frames: impl IntoIterator<Item = Frame>) -> crate::Result<Vec<Element>> {
        let clusters = self.config.assembler(&self.tracks).assemble(frames)?;
        let segment = self.segment(clusters)?;
        Ok(vec![ebml_header(self.config.doc_type), segment])
    }

    /// Mux time-ordered frames straight into a byte sink.
    pub fn write<S: ByteSink>(&self, frames: impl IntoIterator<Item = Frame>, sink: &mut S) -> crate::Result<()> {
        for e in self.mux(frames)? {
            e.write_to(sink)?;
        }
        Ok(())
    }

    fn segment(&self, clusters: Vec<AssembledCluster>) -> crate::Result<Element> {
        let info_len = self.info.encoded_len();
        let tracks_len = self.tracks_element.encoded_len();
        let with_cues = self.config.write_cues && clusters.iter().any(|c| c.cue.is_some());

        let mut seek = SeekIndex::new(ElementType::SeekHead, Placement::Leading, 0);
        seek.push(SeekEntry { target: ElementType::Info }, info_len);
        seek.push(SeekEntry { target: ElementType::Tracks }, tracks_len);
        if with_cues {
            seek.mark(SeekEntry { target: ElementType::Cues });
        }
        let seek_len = seek.stabilize()?;

        let mut children = vec![seek.build()?, self.info.clone(), self.tracks_element.clone()];
        if with_cues {
            let mut cues = CueIndex::new(
                ElementType::Cues,
                Placement::Leading,
                seek_len + info_len + tracks_len,
            );
            for cluster in &clusters {
                match cluster.cue {
                    Some(cue) => cues.push(cue, cluster.encoded_len),
                    None => cues.advance(cluster.encoded_len),
                }
            }
            children.push(cues.build()?);
        }
        info!(
            "Muxed {} clusters, {} tracks{}",
            clusters.len(),
            self.tracks.len(),
            if with_cues { ", with cues" } else { "" }
        );
        children.extend(clusters.into_iter().map(|c| c.element));
        Ok(Element::master(ElementType::Segment, children))
    }
}
