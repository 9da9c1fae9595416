use crate::Result;
use std::io::{Read, Seek, SeekFrom, Write};

/// Random-access byte store the parser reads from.
pub trait ByteStore {
    /// Current read position.
    fn position(&mut self) -> Result<u64>;
    /// Total number of bytes in the store.
    fn size(&mut self) -> Result<u64>;
    /// Move the read position.
    fn set_position(&mut self, pos: u64) -> Result<()>;
    /// Read up to `buf.len()` bytes, returning how many were read. Short reads
    /// only happen at the end of the store.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.read(buf)?;
        if n != buf.len() {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(())
    }
}

impl<T: Read + Seek> ByteStore for T {
    fn position(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn size(&mut self) -> Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if pos != end {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(end)
    }

    fn set_position(&mut self, pos: u64) -> Result<()> {
        self.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match Read::read(self, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

/// Byte sink the muxers write to, addressed by a monotonically increasing
/// virtual position.
pub trait ByteSink {
    /// Number of bytes written so far.
    fn position(&self) -> u64;
    /// Append bytes.
    fn write(&mut self, buf: &[u8]) -> Result<()>;
}

impl ByteSink for Vec<u8> {
    fn position(&self) -> u64 {
        self.len() as u64
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

impl ByteSink for bytes::BytesMut {
    fn position(&self) -> u64 {
        self.len() as u64
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// Adapts any `std::io::Write` into a [`ByteSink`] by counting the bytes written.
#[derive(Debug)]
pub struct PositionedWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> PositionedWriter<W> {
    /// Wrap a writer, starting at virtual position 0.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteSink for PositionedWriter<W> {
    fn position(&self) -> u64 {
        self.position
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

/// Async adapters, with the `tokio` feature.
#[cfg(feature = "tokio")]
pub mod tokio_impl {
    use crate::element::Element;
    use crate::parser::{Parser, ParserConfig};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Read an async stream to its end, then parse it into root elements.
    pub async fn parse_async<R: AsyncRead + Unpin>(
        r: &mut R,
        config: ParserConfig,
    ) -> crate::Result<Vec<Element>> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await?;
        Parser::with_config(std::io::Cursor::new(buf), config).parse()
    }

    /// Encode elements and write them to an async sink.
    pub async fn write_async<W: AsyncWrite + Unpin>(
        w: &mut W,
        elements: &[Element],
    ) -> crate::Result<()> {
        let mut buf = Vec::new();
        for e in elements {
            e.write_to(&mut buf)?;
        }
        w.write_all(&buf).await?;
        w.flush().await?;
        Ok(())
    }
}
