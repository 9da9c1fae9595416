//! The element type registry: value class of every known ID and the set of
//! element types each master admits as direct children.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

/// How an element's payload is interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// A sequence of child elements.
    Master,
    /// Big-endian unsigned integer, 0 to 8 bytes.
    UnsignedInt,
    /// Big-endian two's complement integer, 0 to 8 bytes.
    SignedInt,
    /// IEEE754 float, 0, 4 or 8 bytes.
    Float,
    /// ASCII or UTF-8 text, possibly NUL padded.
    String,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC, 8 bytes.
    Date,
    /// Opaque bytes.
    Binary,
    /// Padding, payload is never interpreted.
    Void,
}

// A helper declaring every element type once: its ID, its value class and the
// types it admits as direct children.
/* example:
schema! {
    Ebml = 0x1A45DFA3, Master, [EbmlVersion, DocType];
    EbmlVersion = 0x4286, UnsignedInt, [];
}
*/
macro_rules! schema {
    ($( $name:ident = $id:literal, $class:ident, [$($child:ident),* $(,)?]; )*) => {
        /// A Matroska element type.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ElementType {
            $(
                #[doc = concat!("`", stringify!($name), "`, ID `", stringify!($id), "`.")]
                $name,
            )*
        }

        impl ElementType {
            /// Every registered type.
            pub const ALL: &'static [ElementType] = &[$(ElementType::$name,)*];

            /// The EBML ID, marker bits included.
            pub const fn id(self) -> u32 {
                match self {
                    $(ElementType::$name => $id,)*
                }
            }

            /// The value class of the payload.
            pub const fn class(self) -> ValueClass {
                match self {
                    $(ElementType::$name => ValueClass::$class,)*
                }
            }

            /// Human readable name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(ElementType::$name => stringify!($name),)*
                }
            }

            fn declared_children(self) -> &'static [ElementType] {
                match self {
                    $(ElementType::$name => &[$(ElementType::$child),*],)*
                }
            }
        }
    };
}

schema! {
    Void = 0xEC, Void, [];
    Crc32 = 0xBF, Binary, [];

    Ebml = 0x1A45DFA3, Master, [
        EbmlVersion, EbmlReadVersion, EbmlMaxIdLength, EbmlMaxSizeLength,
        DocType, DocTypeVersion, DocTypeReadVersion,
    ];
    EbmlVersion = 0x4286, UnsignedInt, [];
    EbmlReadVersion = 0x42F7, UnsignedInt, [];
    EbmlMaxIdLength = 0x42F2, UnsignedInt, [];
    EbmlMaxSizeLength = 0x42F3, UnsignedInt, [];
    DocType = 0x4282, String, [];
    DocTypeVersion = 0x4287, UnsignedInt, [];
    DocTypeReadVersion = 0x4285, UnsignedInt, [];

    Segment = 0x18538067, Master, [
        SeekHead, Info, Tracks, Cues, Cluster, Attachments, Chapters, Tags,
    ];

    SeekHead = 0x114D9B74, Master, [Seek];
    Seek = 0x4DBB, Master, [SeekId, SeekPosition];
    SeekId = 0x53AB, Binary, [];
    SeekPosition = 0x53AC, UnsignedInt, [];

    Info = 0x1549A966, Master, [
        SegmentUid, SegmentFilename, PrevUid, PrevFilename, NextUid, NextFilename,
        SegmentFamily, TimecodeScale, Duration, DateUtc, Title, MuxingApp, WritingApp,
    ];
    SegmentUid = 0x73A4, Binary, [];
    SegmentFilename = 0x7384, String, [];
    PrevUid = 0x3CB923, Binary, [];
    PrevFilename = 0x3C83AB, String, [];
    NextUid = 0x3EB923, Binary, [];
    NextFilename = 0x3E83BB, String, [];
    SegmentFamily = 0x4444, Binary, [];
    TimecodeScale = 0x2AD7B1, UnsignedInt, [];
    Duration = 0x4489, Float, [];
    DateUtc = 0x4461, Date, [];
    Title = 0x7BA9, String, [];
    MuxingApp = 0x4D80, String, [];
    WritingApp = 0x5741, String, [];

    Cluster = 0x1F43B675, Master, [
        Timecode, SilentTracks, Position, PrevSize, SimpleBlock, BlockGroup, EncryptedBlock,
    ];
    Timecode = 0xE7, UnsignedInt, [];
    SilentTracks = 0x5854, Master, [SilentTrackNumber];
    SilentTrackNumber = 0x58D7, UnsignedInt, [];
    Position = 0xA7, UnsignedInt, [];
    PrevSize = 0xAB, UnsignedInt, [];
    SimpleBlock = 0xA3, Binary, [];
    EncryptedBlock = 0xAF, Binary, [];
    BlockGroup = 0xA0, Master, [
        Block, BlockVirtual, BlockAdditions, BlockDuration, ReferencePriority,
        ReferenceBlock, CodecState, DiscardPadding, Slices,
    ];
    Block = 0xA1, Binary, [];
    BlockVirtual = 0xA2, Binary, [];
    BlockAdditions = 0x75A1, Master, [BlockMore];
    BlockMore = 0xA6, Master, [BlockAddId, BlockAdditional];
    BlockAddId = 0xEE, UnsignedInt, [];
    BlockAdditional = 0xA5, Binary, [];
    BlockDuration = 0x9B, UnsignedInt, [];
    ReferencePriority = 0xFA, UnsignedInt, [];
    ReferenceBlock = 0xFB, SignedInt, [];
    CodecState = 0xA4, Binary, [];
    DiscardPadding = 0x75A2, SignedInt, [];
    Slices = 0x8E, Master, [TimeSlice];
    TimeSlice = 0xE8, Master, [LaceNumber];
    LaceNumber = 0xCC, UnsignedInt, [];

    Tracks = 0x1654AE6B, Master, [TrackEntry];
    TrackEntry = 0xAE, Master, [
        TrackNumber, TrackUid, TrackType, FlagEnabled, FlagDefault, FlagForced, FlagLacing,
        MinCache, MaxCache, DefaultDuration, TrackTimecodeScale, MaxBlockAdditionId, Name,
        Language, CodecId, CodecPrivate, CodecName, AttachmentLink, CodecDecodeAll,
        TrackOverlay, CodecDelay, SeekPreRoll, Video, Audio, ContentEncodings,
    ];
    TrackNumber = 0xD7, UnsignedInt, [];
    TrackUid = 0x73C5, UnsignedInt, [];
    TrackType = 0x83, UnsignedInt, [];
    FlagEnabled = 0xB9, UnsignedInt, [];
    FlagDefault = 0x88, UnsignedInt, [];
    FlagForced = 0x55AA, UnsignedInt, [];
    FlagLacing = 0x9C, UnsignedInt, [];
    MinCache = 0x6DE7, UnsignedInt, [];
    MaxCache = 0x6DF8, UnsignedInt, [];
    DefaultDuration = 0x23E383, UnsignedInt, [];
    TrackTimecodeScale = 0x23314F, Float, [];
    MaxBlockAdditionId = 0x55EE, UnsignedInt, [];
    Name = 0x536E, String, [];
    Language = 0x22B59C, String, [];
    CodecId = 0x86, String, [];
    CodecPrivate = 0x63A2, Binary, [];
    CodecName = 0x258688, String, [];
    AttachmentLink = 0x7446, UnsignedInt, [];
    CodecDecodeAll = 0xAA, UnsignedInt, [];
    TrackOverlay = 0x6FAB, UnsignedInt, [];
    CodecDelay = 0x56AA, UnsignedInt, [];
    SeekPreRoll = 0x56BB, UnsignedInt, [];
    Video = 0xE0, Master, [
        FlagInterlaced, StereoMode, AlphaMode, PixelWidth, PixelHeight, PixelCropBottom,
        PixelCropTop, PixelCropLeft, PixelCropRight, DisplayWidth, DisplayHeight,
        DisplayUnit, AspectRatioType, ColourSpace, FrameRate,
    ];
    FlagInterlaced = 0x9A, UnsignedInt, [];
    StereoMode = 0x53B8, UnsignedInt, [];
    AlphaMode = 0x53C0, UnsignedInt, [];
    PixelWidth = 0xB0, UnsignedInt, [];
    PixelHeight = 0xBA, UnsignedInt, [];
    PixelCropBottom = 0x54AA, UnsignedInt, [];
    PixelCropTop = 0x54BB, UnsignedInt, [];
    PixelCropLeft = 0x54CC, UnsignedInt, [];
    PixelCropRight = 0x54DD, UnsignedInt, [];
    DisplayWidth = 0x54B0, UnsignedInt, [];
    DisplayHeight = 0x54BA, UnsignedInt, [];
    DisplayUnit = 0x54B2, UnsignedInt, [];
    AspectRatioType = 0x54B3, UnsignedInt, [];
    ColourSpace = 0x2EB524, Binary, [];
    FrameRate = 0x2383E3, Float, [];
    Audio = 0xE1, Master, [SamplingFrequency, OutputSamplingFrequency, Channels, BitDepth];
    SamplingFrequency = 0xB5, Float, [];
    OutputSamplingFrequency = 0x78B5, Float, [];
    Channels = 0x9F, UnsignedInt, [];
    BitDepth = 0x6264, UnsignedInt, [];
    ContentEncodings = 0x6D80, Master, [ContentEncoding];
    ContentEncoding = 0x6240, Master, [
        ContentEncodingOrder, ContentEncodingScope, ContentEncodingType,
        ContentCompression, ContentEncryption,
    ];
    ContentEncodingOrder = 0x5031, UnsignedInt, [];
    ContentEncodingScope = 0x5032, UnsignedInt, [];
    ContentEncodingType = 0x5033, UnsignedInt, [];
    ContentCompression = 0x5034, Master, [ContentCompAlgo, ContentCompSettings];
    ContentCompAlgo = 0x4254, UnsignedInt, [];
    ContentCompSettings = 0x4255, Binary, [];
    ContentEncryption = 0x5035, Master, [ContentEncAlgo, ContentEncKeyId];
    ContentEncAlgo = 0x47E1, UnsignedInt, [];
    ContentEncKeyId = 0x47E2, Binary, [];

    Cues = 0x1C53BB6B, Master, [CuePoint];
    CuePoint = 0xBB, Master, [CueTime, CueTrackPositions];
    CueTime = 0xB3, UnsignedInt, [];
    CueTrackPositions = 0xB7, Master, [
        CueTrack, CueClusterPosition, CueRelativePosition, CueDuration, CueBlockNumber,
        CueCodecState, CueReference,
    ];
    CueTrack = 0xF7, UnsignedInt, [];
    CueClusterPosition = 0xF1, UnsignedInt, [];
    CueRelativePosition = 0xF0, UnsignedInt, [];
    CueDuration = 0xB2, UnsignedInt, [];
    CueBlockNumber = 0x5378, UnsignedInt, [];
    CueCodecState = 0xEA, UnsignedInt, [];
    CueReference = 0xDB, Master, [CueRefTime];
    CueRefTime = 0x96, UnsignedInt, [];

    Attachments = 0x1941A469, Master, [AttachedFile];
    AttachedFile = 0x61A7, Master, [FileDescription, FileName, FileMimeType, FileData, FileUid];
    FileDescription = 0x467E, String, [];
    FileName = 0x466E, String, [];
    FileMimeType = 0x4660, String, [];
    FileData = 0x465C, Binary, [];
    FileUid = 0x46AE, UnsignedInt, [];

    Chapters = 0x1043A770, Master, [EditionEntry];
    EditionEntry = 0x45B9, Master, [
        EditionUid, EditionFlagHidden, EditionFlagDefault, EditionFlagOrdered, ChapterAtom,
    ];
    EditionUid = 0x45BC, UnsignedInt, [];
    EditionFlagHidden = 0x45BD, UnsignedInt, [];
    EditionFlagDefault = 0x45DB, UnsignedInt, [];
    EditionFlagOrdered = 0x45DD, UnsignedInt, [];
    ChapterAtom = 0xB6, Master, [
        ChapterUid, ChapterStringUid, ChapterTimeStart, ChapterTimeEnd, ChapterFlagHidden,
        ChapterFlagEnabled, ChapterSegmentUid, ChapterSegmentEditionUid,
        ChapterPhysicalEquiv, ChapterTrack, ChapterDisplay, ChapterAtom,
    ];
    ChapterUid = 0x73C4, UnsignedInt, [];
    ChapterStringUid = 0x5654, String, [];
    ChapterTimeStart = 0x91, UnsignedInt, [];
    ChapterTimeEnd = 0x92, UnsignedInt, [];
    ChapterFlagHidden = 0x98, UnsignedInt, [];
    ChapterFlagEnabled = 0x4598, UnsignedInt, [];
    ChapterSegmentUid = 0x6E67, Binary, [];
    ChapterSegmentEditionUid = 0x6EBC, UnsignedInt, [];
    ChapterPhysicalEquiv = 0x63C3, UnsignedInt, [];
    ChapterTrack = 0x8F, Master, [ChapterTrackNumber];
    ChapterTrackNumber = 0x89, UnsignedInt, [];
    ChapterDisplay = 0x80, Master, [ChapString, ChapLanguage, ChapCountry];
    ChapString = 0x85, String, [];
    ChapLanguage = 0x437C, String, [];
    ChapCountry = 0x437E, String, [];

    Tags = 0x1254C367, Master, [Tag];
    Tag = 0x7373, Master, [Targets, SimpleTag];
    Targets = 0x63C0, Master, [
        TargetTypeValue, TargetType, TagTrackUid, TagEditionUid, TagChapterUid, TagAttachmentUid,
    ];
    TargetTypeValue = 0x68CA, UnsignedInt, [];
    TargetType = 0x63CA, String, [];
    TagTrackUid = 0x63C5, UnsignedInt, [];
    TagEditionUid = 0x63C9, UnsignedInt, [];
    TagChapterUid = 0x63C4, UnsignedInt, [];
    TagAttachmentUid = 0x63C6, UnsignedInt, [];
    SimpleTag = 0x67C8, Master, [TagName, TagLanguage, TagDefault, TagString, TagBinary, SimpleTag];
    TagName = 0x45A3, String, [];
    TagLanguage = 0x447A, String, [];
    TagDefault = 0x4484, UnsignedInt, [];
    TagString = 0x4487, String, [];
    TagBinary = 0x4485, Binary, [];
}

struct Schema {
    by_id: HashMap<u32, ElementType>,
    children: HashMap<ElementType, HashSet<ElementType>>,
}

impl Schema {
    fn build() -> Self {
        let by_id = ElementType::ALL.iter().map(|t| (t.id(), *t)).collect();
        let children = ElementType::ALL
            .iter()
            .filter(|t| t.class() == ValueClass::Master)
            .map(|t| (*t, t.declared_children().iter().copied().collect()))
            .collect();
        Self { by_id, children }
    }
}

lazy_static! {
    static ref SCHEMA: Schema = Schema::build();
    static ref NO_CHILDREN: HashSet<ElementType> = HashSet::new();
}

impl ElementType {
    /// Look up a registered ID.
    pub fn from_id(id: u32) -> Option<ElementType> {
        SCHEMA.by_id.get(&id).copied()
    }

    /// Look up an ID, mapping unknown IDs to a [`ElementType::Void`] placeholder.
    pub fn resolve(id: u32) -> ElementType {
        Self::from_id(id).unwrap_or_else(|| {
            log::warn!("Unknown element ID 0x{id:X}, treating it as Void");
            ElementType::Void
        })
    }

    /// Void and CRC-32 may appear under any master, at any position.
    pub fn is_global(self) -> bool {
        matches!(self, ElementType::Void | ElementType::Crc32)
    }

    /// Types that live directly under a Segment, or at the root of the stream.
    pub fn is_top_level(self) -> bool {
        matches!(
            self,
            ElementType::Ebml
                | ElementType::Segment
                | ElementType::SeekHead
                | ElementType::Info
                | ElementType::Tracks
                | ElementType::Cues
                | ElementType::Cluster
                | ElementType::Attachments
                | ElementType::Chapters
                | ElementType::Tags
        )
    }
}

/// Value class of an ID. Unknown IDs resolve to [`ValueClass::Void`].
pub fn class_of(id: u32) -> ValueClass {
    ElementType::resolve(id).class()
}

/// The declared child set of a type. Empty for non-master types.
pub fn allowed_children(ty: ElementType) -> &'static HashSet<ElementType> {
    SCHEMA.children.get(&ty).unwrap_or(&NO_CHILDREN)
}

/// Whether `child` may be nested directly under `parent`.
///
/// Global elements are admitted everywhere. Inside a Cluster any type that is not
/// top-level is admitted as well, since encoders are known to put non-conformant
/// filler there.
pub fn admits(parent: ElementType, child: ElementType) -> bool {
    if child.is_global() {
        return true;
    }
    if allowed_children(parent).contains(&child) {
        return true;
    }
    parent == ElementType::Cluster && !child.is_top_level()
}

/// Whether `ty` may appear at the root of a stream.
pub fn admits_at_root(ty: ElementType) -> bool {
    matches!(ty, ElementType::Ebml | ElementType::Segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{decode_id, id_width};

    #[test]
    fn ids_are_unique() {
        let mut seen = HashSet::new();
        for ty in ElementType::ALL {
            assert!(seen.insert(ty.id()), "duplicate id for {:?}", ty);
        }
    }

    #[test]
    fn id_width_matches_marker() {
        for ty in ElementType::ALL {
            let width = id_width(ty.id());
            let bytes = ty.id().to_be_bytes();
            let (id, len) = decode_id(&bytes[4 - width..]).unwrap();
            assert_eq!(id, ty.id());
            assert_eq!(len, width, "{} has a mismatching length marker", ty.name());
        }
    }

    #[test]
    fn children_are_declared_on_masters_only() {
        for ty in ElementType::ALL {
            if ty.class() != ValueClass::Master {
                assert!(allowed_children(*ty).is_empty(), "{:?}", ty);
            }
        }
        assert!(allowed_children(ElementType::Segment).contains(&ElementType::Cluster));
    }

    #[test]
    fn lookup() {
        assert_eq!(ElementType::from_id(0x1A45DFA3), Some(ElementType::Ebml));
        assert_eq!(ElementType::resolve(0x4321), ElementType::Void);
        assert_eq!(class_of(0xA3), ValueClass::Binary);
        assert_eq!(class_of(0x1F43B675), ValueClass::Master);
        assert_eq!(class_of(0x12), ValueClass::Void);
    }

    #[test]
    fn containment_rules() {
        use ElementType::*;
        assert!(admits(Segment, Tracks));
        assert!(!admits(Tracks, Cluster));
        assert!(admits(TrackEntry, Void));
        assert!(admits(Video, Crc32));
        // Cluster tolerance
        assert!(admits(Cluster, CueTime));
        assert!(admits(Cluster, TrackNumber));
        assert!(!admits(Cluster, Cluster));
        assert!(!admits(Cluster, Cues));
        assert!(!admits(Cluster, Tags));
        assert!(!admits(BlockGroup, TrackNumber));
        assert!(admits_at_root(Ebml));
        assert!(!admits_at_root(Cluster));
    }
}
