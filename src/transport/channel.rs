//! Buffered byte channel over one connection.

use std::{fmt, io, time::Duration};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::ClientStream;
use crate::error::{ClientError, Result};

/// Default read buffer capacity.
pub const DEFAULT_READ_BUFFER: usize = 10 * 1024;

/// Fixed-capacity linear buffer. The cursors never leave this type, so
/// callers cannot desynchronise them.
struct ReadBuffer {
    data: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl ReadBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
        }
    }

    fn available(&self) -> usize { self.filled - self.pos }

    fn take(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos..self.filled)?.first().copied()?;
        self.pos += 1;
        Some(byte)
    }

    fn take_slice(&mut self, max: usize) -> &[u8] {
        let end = self.pos + max.min(self.available());
        let start = self.pos;
        self.pos = end;
        &self.data[start..end]
    }

    /// Reset the cursors and expose the whole buffer for a socket read.
    fn spare(&mut self) -> &mut [u8] {
        self.pos = 0;
        self.filled = 0;
        &mut self.data
    }

    fn commit(&mut self, count: usize) { self.filled = count.min(self.data.len()); }
}

/// A buffered connection to one endpoint.
///
/// Reads go through an internal fixed-capacity buffer that is refilled from
/// the stream only once drained, so bytes are always handed out in arrival
/// order. Each read from the stream is bounded by the idle timeout.
///
/// Closing is idempotent; once closed the channel reports end of stream on
/// reads and fails writes with `NotConnected`.
pub struct ByteChannel<S> {
    stream: Option<S>,
    buffer: ReadBuffer,
    idle_timeout: Option<Duration>,
}

impl<S> fmt::Debug for ByteChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteChannel")
            .field("open", &self.stream.is_some())
            .field("buffered", &self.buffer.available())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl<S: ClientStream> ByteChannel<S> {
    /// Wrap an established stream with the default buffer capacity.
    pub fn new(stream: S, idle_timeout: Option<Duration>) -> Self {
        Self::with_capacity(stream, idle_timeout, DEFAULT_READ_BUFFER)
    }

    /// Wrap an established stream with a read buffer of `capacity` bytes.
    pub fn with_capacity(stream: S, idle_timeout: Option<Duration>, capacity: usize) -> Self {
        Self {
            stream: Some(stream),
            buffer: ReadBuffer::new(capacity),
            idle_timeout,
        }
    }

    /// Returns `true` until [`close`](Self::close) has run.
    #[must_use]
    pub fn is_open(&self) -> bool { self.stream.is_some() }

    /// Refill the buffer from the stream. Returns the number of bytes read;
    /// zero means the peer closed the stream.
    async fn fill(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        let spare = self.buffer.spare();
        let count = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.read(spare))
                .await
                .map_err(|_| ClientError::IdleTimeout(limit))??,
            None => stream.read(spare).await?,
        };
        self.buffer.commit(count);
        log::trace!("filled {count} bytes from stream");
        Ok(count)
    }

    /// Copy available bytes into `dst`, waiting for the stream only when the
    /// buffer is empty. Returns `Ok(0)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IdleTimeout`] when the stream stays silent and
    /// [`ClientError::Io`] on socket failures.
    pub async fn read_available(&mut self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        if self.buffer.available() == 0 && self.fill().await? == 0 {
            return Ok(0);
        }
        let src = self.buffer.take_slice(dst.len());
        let count = src.len();
        dst[..count].copy_from_slice(src);
        Ok(count)
    }

    /// Next byte of the stream, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// See [`read_available`](Self::read_available).
    pub async fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.buffer.take() {
            return Ok(Some(byte));
        }
        if self.fill().await? == 0 {
            return Ok(None);
        }
        Ok(self.buffer.take())
    }

    /// Up to `max` bytes from the buffer, refilling it once if empty.
    /// Returns `None` at end of stream.
    ///
    /// # Errors
    ///
    /// See [`read_available`](Self::read_available).
    pub async fn take_up_to(&mut self, max: usize) -> Result<Option<Bytes>> {
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }
        if self.buffer.available() == 0 && self.fill().await? == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(self.buffer.take_slice(max))))
    }

    /// Write all of `bytes` and flush.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the channel is closed or the write fails.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shut the stream down. Safe to call repeatedly; shutdown errors from an
    /// already broken socket are logged and dropped.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.shutdown().await {
                log::debug!("ignoring shutdown error on close: {error}");
            }
        }
        self.buffer.spare();
    }
}
