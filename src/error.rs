use crate::schema::ElementType;

/// Error types for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid variable-length integer encoding: no marker bit within the allowed width.
    #[error("Invalid variable-length integer encoding, no marker bit within {max_width} bytes")]
    InvalidVarint {
        /// The widest encoding allowed at this position (4 for IDs, 8 for sizes).
        max_width: usize,
    },

    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read past the end of the buffer")]
    OutOfBounds,

    /// A value does not fit the requested encoding.
    #[error("Value {value} does not fit in {width} bytes")]
    ValueTooLarge {
        /// The value that failed to encode.
        value: u64,
        /// The widest encoding that was available.
        width: usize,
    },

    /// Allocating an element payload failed.
    #[error("Out of memory reading {element:?} (ID 0x{id:X}), size {size}B at offset {offset}")]
    OutOfMemory {
        /// Type of the element whose payload could not be materialized.
        element: ElementType,
        /// Raw element ID.
        id: u32,
        /// Declared payload size.
        size: u64,
        /// Byte offset of the element header.
        offset: u64,
    },

    /// A payload exceeded the configured parser limit.
    #[error("Payload of {element:?} (ID 0x{id:X}) is {size}B at offset {offset}, limit is {limit}B")]
    PayloadTooLarge {
        /// Type of the offending element.
        element: ElementType,
        /// Raw element ID.
        id: u32,
        /// Declared payload size.
        size: u64,
        /// Byte offset of the element header.
        offset: u64,
        /// The configured limit.
        limit: u64,
    },

    /// Offset stabilization computed a narrower width than one already assigned.
    #[error("Downsizing the index is not well thought through: width {assigned} assigned, {required} required")]
    IndexWidthShrink {
        /// Width currently assigned to the entry.
        assigned: usize,
        /// Width the entry would now need.
        required: usize,
    },

    /// An encoded offset field did not come out at its assigned width.
    #[error("Encoded offset is {actual} bytes wide, {expected} bytes were assigned")]
    WidthMismatch {
        /// The assigned width.
        expected: usize,
        /// The realized width.
        actual: usize,
    },

    /// The emitted index differs in size from the size the offsets were computed with.
    #[error("Index {element:?} encoded to {actual}B, offsets assumed {expected}B")]
    IndexSizeMismatch {
        /// The index element type.
        element: ElementType,
        /// Size assumed by the stabilizer.
        expected: u64,
        /// Size actually produced.
        actual: u64,
    },

    /// A required element is missing.
    #[error("Missing element {0:?}")]
    StructuralViolation(ElementType),

    /// Two tracks share one track number.
    #[error("Duplicate track number {0}")]
    DuplicateTrackNumber(u64),

    /// A block timecode does not fit the signed 16-bit relative field, or the
    /// absolute timestamp it yields does not fit an `i64`.
    #[error("Block timecode {timecode} is out of range for cluster timecode {cluster}")]
    TimecodeOverflow {
        /// Absolute block timecode.
        timecode: i64,
        /// Base timecode of the enclosing cluster.
        cluster: u64,
    },

    /// A block payload is too short or carries an invalid header.
    #[error("Malformed block data")]
    MalformedBlock,

    /// Malformed lacing data.
    #[error("Malformed lacing data")]
    MalformedLacingData,
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
