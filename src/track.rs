//! The track entry abstraction over TrackEntry elements.

use std::collections::HashSet;

use bytes::Bytes;

use crate::element::Element;
use crate::error::Error;
use crate::schema::ElementType;

/// Media kind of a track, from the TrackType code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// 1
    Video,
    /// 2
    Audio,
    /// 17
    Subtitle,
    /// Anything else.
    Other(u64),
}

impl TrackKind {
    /// Map a TrackType code.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => TrackKind::Video,
            2 => TrackKind::Audio,
            17 => TrackKind::Subtitle,
            c => TrackKind::Other(c),
        }
    }

    /// The TrackType code.
    pub fn code(self) -> u64 {
        match self {
            TrackKind::Video => 1,
            TrackKind::Audio => 2,
            TrackKind::Subtitle => 17,
            TrackKind::Other(c) => c,
        }
    }
}

/// Video settings of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    /// Coded width in pixels.
    pub pixel_width: u64,
    /// Coded height in pixels.
    pub pixel_height: u64,
    /// Display width, defaults to the pixel width.
    pub display_width: Option<u64>,
    /// Display height, defaults to the pixel height.
    pub display_height: Option<u64>,
}

/// Audio settings of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioParams {
    /// Sampling frequency in Hz.
    pub sampling_frequency: f64,
    /// Channel count.
    pub channels: u64,
    /// Bits per sample.
    pub bit_depth: Option<u64>,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sampling_frequency: 8000.0,
            channels: 1,
            bit_depth: None,
        }
    }
}

/// A track, built from a TrackEntry or destined to become one.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Track number, unique within the Segment.
    pub number: u64,
    /// Track UID; the muxer falls back to the track number.
    pub uid: Option<u64>,
    /// Media kind.
    pub kind: TrackKind,
    /// Codec identifier, e.g. `V_VP9`.
    pub codec_id: String,
    /// Codec initialization data.
    pub codec_private: Option<Bytes>,
    /// Human readable name.
    pub name: Option<String>,
    /// Language code.
    pub language: Option<String>,
    /// Nanoseconds per frame.
    pub default_duration: Option<u64>,
    /// Video settings.
    pub video: Option<VideoParams>,
    /// Audio settings.
    pub audio: Option<AudioParams>,
}

impl Track {
    fn new(number: u64, kind: TrackKind, codec_id: impl Into<String>) -> Self {
        Self {
            number,
            uid: None,
            kind,
            codec_id: codec_id.into(),
            codec_private: None,
            name: None,
            language: None,
            default_duration: None,
            video: None,
            audio: None,
        }
    }

    /// A video track.
    pub fn video(number: u64, codec_id: impl Into<String>, width: u64, height: u64) -> Self {
        Self {
            video: Some(VideoParams {
                pixel_width: width,
                pixel_height: height,
                display_width: None,
                display_height: None,
            }),
            ..Self::new(number, TrackKind::Video, codec_id)
        }
    }

    /// An audio track.
    pub fn audio(number: u64, codec_id: impl Into<String>, sampling_frequency: f64, channels: u64) -> Self {
        Self {
            audio: Some(AudioParams {
                sampling_frequency,
                channels,
                bit_depth: None,
            }),
            ..Self::new(number, TrackKind::Audio, codec_id)
        }
    }

    /// Read a TrackEntry. TrackNumber, TrackType and CodecID are required.
    pub fn from_element(entry: &Element) -> crate::Result<Self> {
        let number = entry
            .child_uint(ElementType::TrackNumber)
            .ok_or(Error::StructuralViolation(ElementType::TrackNumber))?;
        let kind = entry
            .child_uint(ElementType::TrackType)
            .map(TrackKind::from_code)
            .ok_or(Error::StructuralViolation(ElementType::TrackType))?;
        let codec_id = entry
            .child_str(ElementType::CodecId)
            .ok_or(Error::StructuralViolation(ElementType::CodecId))?;

        let video = entry.child(ElementType::Video).map(|v| VideoParams {
            pixel_width: v.child_uint(ElementType::PixelWidth).unwrap_or(0),
            pixel_height: v.child_uint(ElementType::PixelHeight).unwrap_or(0),
            display_width: v.child_uint(ElementType::DisplayWidth),
            display_height: v.child_uint(ElementType::DisplayHeight),
        });
        let audio = entry.child(ElementType::Audio).map(|a| {
            let default = AudioParams::default();
            AudioParams {
                sampling_frequency: a
                    .child_float(ElementType::SamplingFrequency)
                    .unwrap_or(default.sampling_frequency),
                channels: a.child_uint(ElementType::Channels).unwrap_or(default.channels),
                bit_depth: a.child_uint(ElementType::BitDepth),
            }
        });

        Ok(Self {
            number,
            uid: entry.child_uint(ElementType::TrackUid),
            kind,
            codec_id: codec_id.to_string(),
            codec_private: entry
                .child(ElementType::CodecPrivate)
                .and_then(Element::as_bytes)
                .cloned(),
            name: entry.child_str(ElementType::Name).map(str::to_string),
            language: entry.child_str(ElementType::Language).map(str::to_string),
            default_duration: entry.child_uint(ElementType::DefaultDuration),
            video,
            audio,
        })
    }

    /// Build the TrackEntry element.
    pub fn to_element(&self) -> Element {
        use ElementType as T;
        let mut children = vec![
            Element::uint(T::TrackNumber, self.number),
            Element::uint(T::TrackUid, self.uid.unwrap_or(self.number)),
            Element::uint(T::TrackType, self.kind.code()),
            Element::uint(T::FlagLacing, 0),
            Element::string(T::CodecId, self.codec_id.as_str()),
        ];
        if let Some(name) = &self.name {
            children.push(Element::string(T::Name, name.as_str()));
        }
        if let Some(language) = &self.language {
            children.push(Element::string(T::Language, language.as_str()));
        }
        if let Some(d) = self.default_duration {
            children.push(Element::uint(T::DefaultDuration, d));
        }
        if let Some(private) = &self.codec_private {
            children.push(Element::binary(T::CodecPrivate, private.clone()));
        }
        if let Some(v) = &self.video {
            let mut params = vec![
                Element::uint(T::PixelWidth, v.pixel_width),
                Element::uint(T::PixelHeight, v.pixel_height),
            ];
            if let Some(w) = v.display_width {
                params.push(Element::uint(T::DisplayWidth, w));
            }
            if let Some(h) = v.display_height {
                params.push(Element::uint(T::DisplayHeight, h));
            }
            children.push(Element::master(T::Video, params));
        }
        if let Some(a) = &self.audio {
            let mut params = vec![
                Element::float(T::SamplingFrequency, a.sampling_frequency),
                Element::uint(T::Channels, a.channels),
            ];
            if let Some(bits) = a.bit_depth {
                params.push(Element::uint(T::BitDepth, bits));
            }
            children.push(Element::master(T::Audio, params));
        }
        Element::master(T::TrackEntry, children)
    }
}

fn check_unique(numbers: impl IntoIterator<Item = u64>) -> crate::Result<()> {
    let mut seen = HashSet::new();
    for n in numbers {
        if !seen.insert(n) {
            return Err(Error::DuplicateTrackNumber(n));
        }
    }
    Ok(())
}

/// Read every TrackEntry of a Tracks element.
pub fn tracks_from_element(tracks: &Element) -> crate::Result<Vec<Track>> {
    let tracks = tracks
        .children_of(ElementType::TrackEntry)
        .map(Track::from_element)
        .collect::<crate::Result<Vec<_>>>()?;
    check_unique(tracks.iter().map(|t| t.number))?;
    Ok(tracks)
}

/// Build a Tracks element.
pub fn tracks_element(tracks: &[Track]) -> crate::Result<Element> {
    check_unique(tracks.iter().map(|t| t.number))?;
    Ok(Element::master(
        ElementType::Tracks,
        tracks.iter().map(Track::to_element).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_round_trip() {
        let mut video = Track::video(1, "V_VP9", 1920, 1080);
        video.language = Some("und".into());
        video.default_duration = Some(33_366_667);
        let mut audio = Track::audio(2, "A_OPUS", 48000.0, 2);
        audio.codec_private = Some(Bytes::from_static(b"OpusHead"));

        let tracks = tracks_element(&[video.clone(), audio.clone()]).unwrap();
        let read = tracks_from_element(&tracks).unwrap();
        assert_eq!(read[0].uid, Some(1));
        assert_eq!(read[0].video, video.video);
        assert_eq!(read[0].language.as_deref(), Some("und"));
        assert_eq!(read[1].kind, TrackKind::Audio);
        assert_eq!(read[1].audio, audio.audio);
        assert_eq!(read[1].codec_private, audio.codec_private);
    }

    #[test]
    fn duplicate_numbers() {
        let tracks = [Track::video(1, "V_VP8", 2, 2), Track::audio(1, "A_VORBIS", 44100.0, 2)];
        assert!(matches!(
            tracks_element(&tracks),
            Err(Error::DuplicateTrackNumber(1))
        ));
    }

    #[test]
    fn missing_codec() {
        let entry = Element::master(
            ElementType::TrackEntry,
            vec![
                Element::uint(ElementType::TrackNumber, 1),
                Element::uint(ElementType::TrackType, 1),
            ],
        );
        assert!(matches!(
            Track::from_element(&entry),
            Err(Error::StructuralViolation(ElementType::CodecId))
        ));
    }
}
