/// A contiguous buffer of bytes.
pub trait Buf: std::fmt::Debug {
    fn remaining(&self) -> usize;
    fn slice(&self, size: usize) -> &[u8];
    fn advance(&mut self, n: usize);
    fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }
}

impl Buf for &[u8] {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn slice(&self, size: usize) -> &[u8] {
        &self[..size]
    }

    fn advance(&mut self, n: usize) {
        *self = &self[n..];
    }
}

// Sizes are derived bottom-up before anything is written, so encoders never
// seek backwards and the forward-only `bytes::BufMut` is enough.
pub use bytes::BufMut;
