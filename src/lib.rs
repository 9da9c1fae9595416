#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod functional;
pub use functional::coding::*;
/// Error types for this crate.
mod error;
pub use error::*;

/// Variable-length integer types and utilities.
pub mod base;
/// I/O utilities.
pub mod io;
/// The static element type registry and containment rules.
pub mod schema;

mod element;
pub use element::*;

pub mod block;
pub mod cluster;
/// Frames and the read-only Cluster view.
pub mod frame;
pub mod index;
/// Lacing of several frames into one block.
pub mod lacer;
pub mod mux;
pub mod parser;
pub mod stream;
pub mod track;
pub mod view;

/// The commonly used types.
pub mod prelude {
    pub use crate::base::DataSize;
    pub use crate::block::Block;
    pub use crate::cluster::{AssembledCluster, ClusterAssembler};
    pub use crate::element::{Element, Value};
    pub use crate::frame::{ClusterView, Frame};
    pub use crate::index::{CueEntry, OffsetIndex, Placement, SeekEntry};
    pub use crate::io::{ByteSink, ByteStore};
    pub use crate::mux::{DocType, Muxer, MuxerConfig};
    pub use crate::parser::{parse_bytes, Parser, ParserConfig};
    pub use crate::schema::{ElementType, ValueClass};
    pub use crate::stream::StreamingMuxer;
    pub use crate::track::{Track, TrackKind};
    pub use crate::view::MatroskaView;
    pub use crate::{Decode, Encode, Error, Result};
}
