use bytes::Bytes;

use crate::base::*;
use crate::error::Error;
use crate::functional::*;
use crate::io::ByteSink;
use crate::schema::{ElementType, ValueClass};

/// Payload of an element node, tagged by value class.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Ordered children; the order is the serialization order.
    Master(Vec<Element>),
    /// Unsigned integer.
    UnsignedInt(u64),
    /// Signed integer.
    SignedInt(i64),
    /// 4 or 8 byte float, widened.
    Float(f64),
    /// Text with trailing NULs stripped.
    String(String),
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    Date(i64),
    /// Opaque bytes.
    Binary(Bytes),
    /// Padding of the given length.
    Void(u64),
}

/// A node of the element tree.
///
/// Offsets and the declared size are filled in by the parser and are zero for
/// nodes built in memory; they are not used when encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Schema type. Unknown IDs are typed as [`ElementType::Void`].
    pub ty: ElementType,
    /// ID as found on the wire.
    pub id: u32,
    /// Byte offset of the element header.
    pub offset: u64,
    /// Byte offset of the payload.
    pub data_offset: u64,
    /// Payload size as declared in the header.
    pub size: DataSize,
    /// Pinned payload width. Integers are encoded in at least this many bytes,
    /// floats in exactly 4 or 8, strings are NUL padded up to it. A width of 0
    /// keeps a zero numeric or date payload empty.
    pub width: Option<usize>,
    /// The payload.
    pub value: Value,
}

impl Element {
    fn new(ty: ElementType, value: Value) -> Self {
        Self {
            ty,
            id: ty.id(),
            offset: 0,
            data_offset: 0,
            size: DataSize::Known(0),
            width: None,
            value,
        }
    }

    /// A master element with the given children.
    pub fn master(ty: ElementType, children: Vec<Element>) -> Self {
        Self::new(ty, Value::Master(children))
    }

    /// An unsigned integer leaf.
    pub fn uint(ty: ElementType, value: u64) -> Self {
        Self::new(ty, Value::UnsignedInt(value))
    }

    /// An unsigned integer leaf encoded in at least `width` bytes.
    pub fn uint_pinned(ty: ElementType, value: u64, width: usize) -> Self {
        Self {
            width: Some(width),
            ..Self::uint(ty, value)
        }
    }

    /// A signed integer leaf.
    pub fn int(ty: ElementType, value: i64) -> Self {
        Self::new(ty, Value::SignedInt(value))
    }

    /// A float leaf, encoded in 8 bytes unless pinned to 4.
    pub fn float(ty: ElementType, value: f64) -> Self {
        Self::new(ty, Value::Float(value))
    }

    /// A text leaf.
    pub fn string(ty: ElementType, value: impl Into<String>) -> Self {
        Self::new(ty, Value::String(value.into()))
    }

    /// A date leaf.
    pub fn date(ty: ElementType, nanos: i64) -> Self {
        Self::new(ty, Value::Date(nanos))
    }

    /// A binary leaf.
    pub fn binary(ty: ElementType, value: impl Into<Bytes>) -> Self {
        Self::new(ty, Value::Binary(value.into()))
    }

    /// A Void element with `len` bytes of zero padding.
    pub fn void(len: u64) -> Self {
        Self::new(ElementType::Void, Value::Void(len))
    }

    /// The value class of the node.
    pub fn class(&self) -> ValueClass {
        match self.value {
            Value::Master(_) => ValueClass::Master,
            Value::UnsignedInt(_) => ValueClass::UnsignedInt,
            Value::SignedInt(_) => ValueClass::SignedInt,
            Value::Float(_) => ValueClass::Float,
            Value::String(_) => ValueClass::String,
            Value::Date(_) => ValueClass::Date,
            Value::Binary(_) => ValueClass::Binary,
            Value::Void(_) => ValueClass::Void,
        }
    }

    /// Children of a master, empty for leaves.
    pub fn children(&self) -> &[Element] {
        match &self.value {
            Value::Master(children) => children,
            _ => &[],
        }
    }

    /// Mutable children of a master, `None` for leaves.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Element>> {
        match &mut self.value {
            Value::Master(children) => Some(children),
            _ => None,
        }
    }

    /// The first direct child of the given type.
    pub fn child(&self, ty: ElementType) -> Option<&Element> {
        self.children().iter().find(|c| c.ty == ty)
    }

    /// All direct children of the given type.
    pub fn children_of(&self, ty: ElementType) -> impl Iterator<Item = &Element> + '_ {
        self.children().iter().filter(move |c| c.ty == ty)
    }

    /// Follow a path of first-matching children.
    pub fn path(&self, path: &[ElementType]) -> Option<&Element> {
        path.iter().try_fold(self, |node, ty| node.child(*ty))
    }

    /// The first child of type `ty`, or a [`Error::StructuralViolation`].
    pub fn require(&self, ty: ElementType) -> crate::Result<&Element> {
        self.child(ty).ok_or(Error::StructuralViolation(ty))
    }

    /// Unsigned value of a child leaf.
    pub fn child_uint(&self, ty: ElementType) -> Option<u64> {
        self.child(ty).and_then(Element::as_uint)
    }

    /// Text value of a child leaf.
    pub fn child_str(&self, ty: ElementType) -> Option<&str> {
        self.child(ty).and_then(Element::as_str)
    }

    /// Float value of a child leaf.
    pub fn child_float(&self, ty: ElementType) -> Option<f64> {
        self.child(ty).and_then(Element::as_float)
    }

    /// Unsigned value, if this is an unsigned leaf.
    pub fn as_uint(&self) -> Option<u64> {
        match self.value {
            Value::UnsignedInt(v) => Some(v),
            _ => None,
        }
    }

    /// Signed value, if this is a signed leaf.
    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::SignedInt(v) => Some(v),
            _ => None,
        }
    }

    /// Float value, if this is a float leaf.
    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Text value, if this is a string leaf.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Date value, if this is a date leaf.
    pub fn as_date(&self) -> Option<i64> {
        match self.value {
            Value::Date(v) => Some(v),
            _ => None,
        }
    }

    /// Bytes, if this is a binary leaf.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.value {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Encoded payload length, re-derived from the current children and values.
    pub fn payload_len(&self) -> u64 {
        match &self.value {
            Value::UnsignedInt(0) | Value::SignedInt(0) | Value::Date(0) if self.width == Some(0) => 0,
            Value::Float(v) if self.width == Some(0) && *v == 0.0 => 0,
            Value::Master(children) => children.iter().map(Element::encoded_len).sum(),
            Value::UnsignedInt(v) => uint_width(*v).max(self.width.unwrap_or(0)) as u64,
            Value::SignedInt(v) => int_width(*v).max(self.width.unwrap_or(0)) as u64,
            Value::Float(_) => match self.width {
                Some(4) => 4,
                _ => 8,
            },
            Value::String(s) => s.len().max(self.width.unwrap_or(0)) as u64,
            Value::Date(_) => 8,
            Value::Binary(b) => b.len() as u64,
            Value::Void(n) => *n,
        }
    }

    /// Length of the ID and size fields.
    pub fn header_len(&self) -> u64 {
        (id_width(self.id) + size_width(self.payload_len())) as u64
    }

    /// Total encoded length, header included.
    pub fn encoded_len(&self) -> u64 {
        let payload = self.payload_len();
        id_width(self.id) as u64 + size_width(payload) as u64 + payload
    }

    /// Write the element to a byte sink.
    pub fn write_to<S: ByteSink>(&self, sink: &mut S) -> crate::Result<()> {
        let buf = self.encode_to_vec()?;
        sink.write(&buf)
    }
}

impl Encode for Element {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let payload = self.payload_len();
        encode_id(self.id, buf);
        buf.put_slice(&encode_size(payload, 1)?);
        if payload == 0 {
            return Ok(());
        }
        let width = payload as usize;
        match &self.value {
            Value::Master(children) => children.encode(buf)?,
            Value::UnsignedInt(v) => encode_uint(*v, width, buf)?,
            Value::SignedInt(v) => encode_int(*v, width, buf)?,
            Value::Float(v) if width == 4 => buf.put_f32(*v as f32),
            Value::Float(v) => buf.put_f64(*v),
            Value::String(s) => {
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, width - s.len());
            }
            Value::Date(v) => buf.put_i64(*v),
            Value::Binary(b) => buf.put_slice(b),
            Value::Void(n) => buf.put_bytes(0, *n as usize),
        }
        Ok(())
    }
}
