//! Byte stream to element tree.

use bytes::Bytes;
use log::{debug, info, warn};

use crate::base::*;
use crate::element::{Element, Value};
use crate::error::Error;
use crate::functional::Decode;
use crate::io::ByteStore;
use crate::schema::{self, ElementType, ValueClass};

/// Widest possible header: 4 byte ID and 8 byte size.
const MAX_HEADER_LEN: usize = MAX_ID_WIDTH + MAX_SIZE_WIDTH;

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Payloads declared larger than this are rejected with [`Error::PayloadTooLarge`].
    pub max_payload_len: Option<u64>,
    /// Keep Void elements, and unknown elements typed as Void, in the tree.
    pub keep_void: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_payload_len: None,
            keep_void: true,
        }
    }
}

/// A master element whose children are still being read.
struct OpenScope {
    element: Element,
    /// Declared end of the payload, `None` for unknown sizes.
    end: Option<u64>,
}

enum HeaderRead {
    Header(Header),
    /// No valid length marker at this position.
    Invalid,
    /// The stream ends inside the header.
    Truncated,
}

/// Reads a byte store into a tree of elements.
///
/// Open masters are kept on an explicit stack rather than the call stack, so
/// nesting depth in the input never grows recursion depth.
pub struct Parser<S: ByteStore> {
    store: S,
    config: ParserConfig,
    stack: Vec<OpenScope>,
    roots: Vec<Element>,
}

/// Parse an in-memory buffer with the default configuration.
pub fn parse_bytes(bytes: &[u8]) -> crate::Result<Vec<Element>> {
    Parser::new(std::io::Cursor::new(bytes)).parse()
}

impl<S: ByteStore> Parser<S> {
    /// Create a parser reading from the store's current position.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ParserConfig::default())
    }

    /// Create a parser with explicit settings.
    pub fn with_config(store: S, config: ParserConfig) -> Self {
        Self {
            store,
            config,
            stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Parse until the end of the store, returning the root elements.
    pub fn parse(mut self) -> crate::Result<Vec<Element>> {
        let len = self.store.size()?;
        let mut pos = self.store.position()?;
        let mut junk_start: Option<u64> = None;

        while pos < len {
            let header = match self.read_header(pos, len)? {
                HeaderRead::Header(h) => h,
                HeaderRead::Invalid => {
                    junk_start.get_or_insert(pos);
                    pos += 1;
                    continue;
                }
                HeaderRead::Truncated => {
                    warn!("Truncated element header at offset {pos}, stopping");
                    break;
                }
            };
            if let Some(start) = junk_start.take() {
                warn!("Resynchronized at offset {pos} after {} junk bytes", pos - start);
            }

            let ty = ElementType::resolve(header.id);
            let data_offset = pos + header.len as u64;
            self.close_ended(pos);
            self.close_unadmitting(ty);
            if self.stack.is_empty() && !schema::admits_at_root(ty) {
                warn!("{} (0x{:X}) at offset {pos} outside of any master", ty.name(), header.id);
            }

            let mut element = Element {
                ty,
                id: header.id,
                offset: pos,
                data_offset,
                size: header.size,
                width: None,
                value: Value::Void(0),
            };

            if ty.class() == ValueClass::Master {
                element.value = Value::Master(Vec::new());
                let end = header.size.known().map(|s| data_offset.saturating_add(s));
                debug!("Open {} at offset {pos}", ty.name());
                self.stack.push(OpenScope { element, end });
                pos = data_offset;
                continue;
            }

            let boundary = self
                .stack
                .last()
                .and_then(|s| s.end)
                .map_or(len, |end| end.min(len));
            let end = match header.size {
                DataSize::Known(size) => data_offset.saturating_add(size),
                DataSize::Unknown => boundary.max(data_offset),
            };
            let end = if end <= boundary {
                end
            } else if ty.is_global() && header.id == ty.id() {
                // Void and CRC-32 keep their own size; the parent closes behind them.
                warn!(
                    "{} at offset {pos} ends at {end}, past its parent boundary {boundary}; keeping it",
                    ty.name()
                );
                end.min(len)
            } else {
                // Nested size disagrees with the parent's, some encoders do this.
                warn!(
                    "{} at offset {pos} ends at {end}, past its parent boundary {boundary}; skipping to the boundary",
                    ty.name()
                );
                pos = boundary.max(pos + 1);
                continue;
            };

            let payload_len = end - data_offset;
            element.value = self.read_value(&element, payload_len)?;
            match &element.value {
                Value::UnsignedInt(_) | Value::SignedInt(_) | Value::Float(_) | Value::Date(_) => {
                    element.width = Some(payload_len as usize);
                }
                Value::String(s) if (s.len() as u64) < payload_len => {
                    element.width = Some(payload_len as usize);
                }
                _ => {}
            }
            if ty == ElementType::Void && !self.config.keep_void {
                info!("Dropping Void element at offset {pos}, size: {payload_len}B");
            } else {
                self.attach(element);
            }
            pos = end;
        }

        if let Some(start) = junk_start {
            warn!("Discarded {} trailing junk bytes at offset {start}", len - start);
        }
        while !self.stack.is_empty() {
            self.close_top();
        }
        Ok(self.roots)
    }

    /// Give back the byte store.
    pub fn into_inner(self) -> S {
        self.store
    }

    fn read_header(&mut self, pos: u64, len: u64) -> crate::Result<HeaderRead> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        let want = (len - pos).min(MAX_HEADER_LEN as u64) as usize;
        self.store.set_position(pos)?;
        let n = self.store.read(&mut buf[..want])?;
        match Header::decode(&mut &buf[..n]) {
            Ok(header) => Ok(HeaderRead::Header(header)),
            Err(Error::InvalidVarint { .. }) => Ok(HeaderRead::Invalid),
            Err(Error::OutOfBounds) => Ok(HeaderRead::Truncated),
            Err(e) => Err(e),
        }
    }

    /// Close scopes whose declared payload ends at or before `pos`.
    fn close_ended(&mut self, pos: u64) {
        while let Some(end) = self.stack.last().map(|s| s.end) {
            match end {
                Some(end) if end <= pos => self.close_top(),
                _ => break,
            }
        }
    }

    /// Close scopes until the innermost one admits `ty`.
    fn close_unadmitting(&mut self, ty: ElementType) {
        while let Some(top) = self.stack.last() {
            let parent = top.element.ty;
            if schema::admits(parent, ty) {
                if parent == ElementType::Cluster
                    && !ty.is_global()
                    && !schema::allowed_children(parent).contains(&ty)
                {
                    warn!("Tolerating {} inside a Cluster", ty.name());
                }
                break;
            }
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        if let Some(scope) = self.stack.pop() {
            debug!(
                "Close {} with {} children",
                scope.element.ty.name(),
                scope.element.children().len()
            );
            self.attach(scope.element);
        }
    }

    fn attach(&mut self, element: Element) {
        match self.stack.last_mut() {
            Some(scope) => {
                if let Some(children) = scope.element.children_mut() {
                    children.push(element);
                }
            }
            None => self.roots.push(element),
        }
    }

    fn read_value(&mut self, element: &Element, len: u64) -> crate::Result<Value> {
        let class = element.ty.class();
        if class == ValueClass::Void {
            return Ok(Value::Void(len));
        }
        let payload = self.read_payload(element, len)?;
        let value = match class {
            ValueClass::UnsignedInt => decode_uint(&payload).map(Value::UnsignedInt),
            ValueClass::SignedInt => decode_int(&payload).map(Value::SignedInt),
            ValueClass::Float => match payload.len() {
                0 => Some(Value::Float(0.0)),
                4 => Some(Value::Float(f32::from_be_bytes([
                    payload[0], payload[1], payload[2], payload[3],
                ]) as f64)),
                8 => decode_uint(&payload).map(|v| Value::Float(f64::from_bits(v))),
                _ => None,
            },
            ValueClass::Date => match payload.len() {
                0 => Some(Value::Date(0)),
                8 => decode_int(&payload).map(Value::Date),
                _ => None,
            },
            ValueClass::String => {
                let text = payload.split(|b| *b == 0).next().unwrap_or(&payload[..]);
                Some(Value::String(String::from_utf8_lossy(text).into_owned()))
            }
            ValueClass::Binary | ValueClass::Master | ValueClass::Void => None,
        };
        Ok(value.unwrap_or_else(|| {
            if class != ValueClass::Binary {
                warn!(
                    "{} at offset {} has an invalid {len}B payload, keeping raw bytes",
                    element.ty.name(),
                    element.offset
                );
            }
            Value::Binary(Bytes::from(payload))
        }))
    }

    fn read_payload(&mut self, element: &Element, len: u64) -> crate::Result<Vec<u8>> {
        if let Some(limit) = self.config.max_payload_len
            && len > limit
        {
            return Err(Error::PayloadTooLarge {
                element: element.ty,
                id: element.id,
                size: len,
                offset: element.offset,
                limit,
            });
        }
        let oom = || Error::OutOfMemory {
            element: element.ty,
            id: element.id,
            size: len,
            offset: element.offset,
        };
        let size = usize::try_from(len).map_err(|_| oom())?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| oom())?;
        buf.resize(size, 0);
        self.store.set_position(element.data_offset)?;
        self.store.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functional::Encode;
    use ElementType::*;

    const EBML_HEADER: [u8; 24] = [
        0x1a, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88, 0x6D, 0x61, 0x74, 0x72, 0x6F, 0x73, 0x6B,
        0x61, 0x42, 0x87, 0x81, 0x01, 0x42, 0x85, 0x81, 0x01,
    ];

    #[test]
    fn read_ebml() {
        let roots = parse_bytes(&EBML_HEADER).unwrap();
        assert_eq!(roots.len(), 1);
        let ebml = &roots[0];
        assert_eq!(ebml.ty, Ebml);
        assert_eq!(ebml.offset, 0);
        assert_eq!(ebml.data_offset, 5);
        assert_eq!(ebml.size, DataSize::Known(19));
        assert_eq!(ebml.child_str(DocType), Some("matroska"));
        assert_eq!(ebml.child_uint(DocTypeVersion), Some(1));
        assert_eq!(ebml.child(DocTypeReadVersion).unwrap().offset, 20);
    }

    #[test]
    fn siblings_close_by_schema() {
        let tracks = Element::master(
            Tracks,
            vec![
                Element::master(TrackEntry, vec![Element::uint(TrackNumber, 1)]),
                Element::master(TrackEntry, vec![Element::uint(TrackNumber, 2)]),
            ],
        );
        let mut bytes = tracks.encode_to_vec().unwrap();
        // The first entry claims a huge size; schema rules still close it.
        bytes.splice(6..7, encode_size(0x1000, 1).unwrap());
        let roots = parse_bytes(&bytes).unwrap();
        let tracks = &roots[0];
        let entries: Vec<_> = tracks.children_of(TrackEntry).collect();
        assert_eq!(entries.len(), 2, "{tracks:#?}");
        assert_eq!(entries[0].children().len(), 1);
        assert_eq!(entries[1].child_uint(TrackNumber), Some(2));
    }

    #[test]
    fn recursive_masters_close_by_size() {
        let tag = Element::master(
            Tag,
            vec![
                Element::master(SimpleTag, vec![Element::string(TagName, "A")]),
                Element::master(SimpleTag, vec![Element::string(TagName, "B")]),
            ],
        );
        let roots = parse_bytes(&tag.encode_to_vec().unwrap()).unwrap();
        assert_eq!(roots[0].children_of(SimpleTag).count(), 2);
    }

    #[test]
    fn unknown_ids_become_void() {
        let mut bytes = vec![0x1A, 0x45, 0xDF, 0xA3, 0x88];
        bytes.extend_from_slice(&[0x43, 0x21, 0x81, 0xAA]); // unknown 0x4321
        bytes.extend_from_slice(&[0x42, 0x86, 0x81, 0x01]); // EBMLVersion
        let roots = parse_bytes(&bytes).unwrap();
        let children = roots[0].children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].ty, Void);
        assert_eq!(children[0].id, 0x4321);
        assert_eq!(children[0].value, Value::Void(1));
        assert_eq!(children[1].as_uint(), Some(1));

        let config = ParserConfig {
            keep_void: false,
            ..Default::default()
        };
        let roots = Parser::with_config(std::io::Cursor::new(&bytes), config)
            .parse()
            .unwrap();
        assert_eq!(roots[0].children().len(), 1);
    }

    #[test]
    fn leaf_overrunning_parent_is_skipped() {
        // Info of 8 bytes whose Title claims 16.
        let mut bytes = vec![0x15, 0x49, 0xA9, 0x66, 0x88];
        bytes.extend_from_slice(&[0x7B, 0xA9, 0x90, b'a', b'b', b'c', b'd', b'e']);
        bytes.extend_from_slice(&EBML_HEADER);
        let roots = parse_bytes(&bytes).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].ty, Info);
        assert!(roots[0].children().is_empty());
        assert_eq!(roots[1].ty, Ebml);
        assert_eq!(roots[1].offset, 13);
    }

    #[test]
    fn global_overrunning_parent_is_kept() {
        // Info of 7 bytes: TimecodeScale (5B), then a Void claiming 3 bytes
        // which end 3 bytes past Info.
        let mut bytes = vec![0x15, 0x49, 0xA9, 0x66, 0x87];
        bytes.extend_from_slice(&[0x2A, 0xD7, 0xB1, 0x81, 0x01]);
        bytes.extend_from_slice(&[0xEC, 0x83, 0x00, 0x00, 0x00]);
        // Info of 6 bytes whose CRC-32 runs 5 bytes past it.
        bytes.extend_from_slice(&[0x15, 0x49, 0xA9, 0x66, 0x86]);
        bytes.extend_from_slice(&[0x2A, 0xD7, 0xB1, 0x81, 0x02]);
        bytes.extend_from_slice(&[0xBF, 0x84, 0xDE, 0xAD, 0xBE, 0xEF]);
        bytes.extend_from_slice(&EBML_HEADER);

        let roots = parse_bytes(&bytes).unwrap();
        assert_eq!(roots.len(), 3, "{roots:#?}");

        let children = roots[0].children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].as_uint(), Some(1));
        assert_eq!(children[1].ty, Void);
        assert_eq!(children[1].offset, 10);
        assert_eq!(children[1].value, Value::Void(3));

        assert_eq!(roots[1].offset, 15);
        let crc = roots[1].child(Crc32).unwrap();
        assert_eq!(&crc.as_bytes().unwrap()[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(roots[1].child_uint(TimecodeScale), Some(2));

        assert_eq!(roots[2].ty, Ebml);
        assert_eq!(roots[2].offset, 31);
    }

    #[test]
    fn global_overrunning_stream_end_is_clamped() {
        let bytes = [0x15, 0x49, 0xA9, 0x66, 0x84, 0xEC, 0x88, 0x00, 0x00];
        let roots = parse_bytes(&bytes).unwrap();
        assert_eq!(roots[0].children()[0].value, Value::Void(2));
    }

    /// A store that reports a huge length but only holds a few real bytes.
    struct SparseStore {
        data: Vec<u8>,
        len: u64,
        pos: u64,
    }

    impl std::io::Read for SparseStore {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let start = self.pos.min(self.data.len() as u64) as usize;
            let n = (self.data.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.pos += n as u64;
            Ok(n)
        }
    }

    impl std::io::Seek for SparseStore {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.pos = match pos {
                std::io::SeekFrom::Start(p) => p,
                std::io::SeekFrom::End(d) => self.len.saturating_add_signed(d),
                std::io::SeekFrom::Current(d) => self.pos.saturating_add_signed(d),
            };
            Ok(self.pos)
        }
    }

    #[test]
    fn huge_payload_is_out_of_memory() {
        // CodecPrivate declaring 2^55 bytes.
        let store = SparseStore {
            data: vec![0x63, 0xA2, 0x01, 0x80, 0, 0, 0, 0, 0, 0],
            len: 1 << 62,
            pos: 0,
        };
        let err = Parser::new(store).parse().unwrap_err();
        assert!(
            matches!(
                err,
                Error::OutOfMemory {
                    element: CodecPrivate,
                    id: 0x63A2,
                    size,
                    offset: 0,
                } if size == 1 << 55
            ),
            "{err:?}"
        );
    }

    #[test]
    fn non_canonical_leaves_reencode_exactly() {
        let mut bytes = vec![0xAE, 0x8C];
        bytes.extend_from_slice(&[0xD7, 0x81, 0x01]); // TrackNumber
        bytes.extend_from_slice(&[0x88, 0x80]); // empty FlagDefault
        bytes.extend_from_slice(&[0x86, 0x85, b'A', b'_', b'X', 0, 0]); // padded CodecID
        let roots = parse_bytes(&bytes).unwrap();
        let entry = &roots[0];
        assert_eq!(entry.child_uint(FlagDefault), Some(0));
        assert_eq!(entry.child_str(CodecId), Some("A_X"));
        assert_eq!(entry.encode_to_vec().unwrap(), bytes);
    }

    #[test]
    fn unknown_size_cluster() {
        let mut bytes = vec![0x1F, 0x43, 0xB6, 0x75, 0xFF];
        bytes.extend_from_slice(&[0xE7, 0x81, 0x05]);
        bytes.extend_from_slice(&[0xA3, 0x84, 0x81, 0x00, 0x00, 0x80]);
        bytes.extend_from_slice(&[0x1F, 0x43, 0xB6, 0x75, 0xFF, 0xE7, 0x81, 0x06]);
        let roots = parse_bytes(&bytes).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].children().len(), 2);
        assert_eq!(roots[0].size, DataSize::Unknown);
        assert_eq!(roots[1].child_uint(Timecode), Some(6));
    }

    #[test]
    fn typed_leaves() {
        let info = Element::master(
            Info,
            vec![
                Element::uint(TimecodeScale, 1_000_000),
                Element::float(Duration, 1234.5),
                Element::date(DateUtc, -42),
                Element::string(Title, "caf\u{e9}"),
            ],
        );
        let roots = parse_bytes(&info.encode_to_vec().unwrap()).unwrap();
        let parsed = &roots[0];
        assert_eq!(parsed.child_uint(TimecodeScale), Some(1_000_000));
        assert_eq!(parsed.child_float(Duration), Some(1234.5));
        assert_eq!(parsed.child(DateUtc).unwrap().as_date(), Some(-42));
        assert_eq!(parsed.child_str(Title), Some("caf\u{e9}"));
    }

    #[test]
    fn payload_limit() {
        let config = ParserConfig {
            max_payload_len: Some(4),
            ..Default::default()
        };
        let bytes = Element::binary(CodecPrivate, vec![0u8; 8])
            .encode_to_vec()
            .unwrap();
        let err = Parser::with_config(std::io::Cursor::new(bytes), config)
            .parse()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadTooLarge {
                element: CodecPrivate,
                id: 0x63A2,
                size: 8,
                offset: 0,
                limit: 4
            }
        ));
    }
}
