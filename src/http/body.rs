//! Response body decoding.
//!
//! The decoder exposes the bytes of the current body segment one at a time
//! (or as slices) and reports `None` once the body is exhausted. Framing is
//! selected from the response head and carried in [`BodyMode`].

use bytes::Bytes;

use crate::{
    error::{ClientError, ProtocolError, Result},
    transport::{ByteChannel, ClientStream},
};

/// Progress through a chunked body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Expecting a chunk-size line.
    Size,
    /// Inside chunk data with `remaining` bytes left.
    Data {
        /// Bytes of the current chunk not yet consumed.
        remaining: u64,
    },
    /// Chunk data consumed; expecting its CRLF.
    DataEnd,
    /// Zero-size chunk seen; skipping trailer lines.
    Trailer,
    /// Body complete.
    Finished,
}

/// Framing of the body currently being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyMode {
    /// No length information: the body runs until the peer closes.
    Unbounded,
    /// `Content-Length` framing.
    ContentLength {
        /// Length announced by the head.
        declared: u64,
        /// Bytes still to be read.
        remaining: u64,
    },
    /// `Transfer-Encoding: chunked` framing.
    Chunked(ChunkState),
}

impl BodyMode {
    /// Framing for a body announced as `declared` bytes long.
    #[must_use]
    pub const fn content_length(declared: u64) -> Self {
        Self::ContentLength {
            declared,
            remaining: declared,
        }
    }

    /// Framing for a chunked body that has not started yet.
    #[must_use]
    pub const fn chunked() -> Self { Self::Chunked(ChunkState::Size) }

    /// Returns `true` once a length-delimited body has been fully consumed.
    /// Unbounded bodies only end when the stream does.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::ContentLength { remaining: 0, .. } | Self::Chunked(ChunkState::Finished)
        )
    }
}

/// Decoding cursor for one response body.
#[derive(Debug)]
pub(crate) struct BodyDecoder {
    mode: BodyMode,
    received: u64,
}

impl BodyDecoder {
    pub(crate) const fn new(mode: BodyMode) -> Self { Self { mode, received: 0 } }

    pub(crate) const fn mode(&self) -> BodyMode { self.mode }

    pub(crate) const fn received(&self) -> u64 { self.received }

    pub(crate) fn reset(&mut self, mode: BodyMode) {
        self.mode = mode;
        self.received = 0;
    }

    /// Next body byte, or `None` once the body is exhausted.
    pub(crate) async fn next_byte<S: ClientStream>(
        &mut self,
        channel: &mut ByteChannel<S>,
    ) -> Result<Option<u8>> {
        if self.prepare(channel).await? == 0 {
            return Ok(None);
        }
        match channel.next_byte().await? {
            Some(byte) => {
                self.consume(1);
                Ok(Some(byte))
            }
            None => self.end_of_stream(),
        }
    }

    /// Up to `max` bytes of the current segment, or `None` once the body is
    /// exhausted. Never crosses a chunk boundary.
    pub(crate) async fn next_slice<S: ClientStream>(
        &mut self,
        channel: &mut ByteChannel<S>,
        max: usize,
    ) -> Result<Option<Bytes>> {
        let available = self.prepare(channel).await?;
        if available == 0 {
            return Ok(None);
        }
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }
        match channel.take_up_to(max.min(available)).await? {
            Some(bytes) => {
                self.consume(bytes.len() as u64);
                Ok(Some(bytes))
            }
            None => self.end_of_stream(),
        }
    }

    /// Advance the framing state until data is available or the body ends.
    /// Returns the number of bytes readable before the next framing element;
    /// zero means the body is complete.
    async fn prepare<S: ClientStream>(&mut self, channel: &mut ByteChannel<S>) -> Result<usize> {
        loop {
            match self.mode {
                BodyMode::Unbounded => return Ok(usize::MAX),
                BodyMode::ContentLength { remaining, .. } => return Ok(clamp(remaining)),
                BodyMode::Chunked(state) => match state {
                    ChunkState::Size => {
                        let size = self.read_chunk_size(channel).await?;
                        self.mode = BodyMode::Chunked(if size == 0 {
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data { remaining: size }
                        });
                    }
                    ChunkState::Data { remaining } => return Ok(clamp(remaining)),
                    ChunkState::DataEnd => {
                        self.read_chunk_terminator(channel).await?;
                        self.mode = BodyMode::Chunked(ChunkState::Size);
                    }
                    ChunkState::Trailer => {
                        skip_trailer(channel).await?;
                        self.mode = BodyMode::Chunked(ChunkState::Finished);
                    }
                    ChunkState::Finished => return Ok(0),
                },
            }
        }
    }

    fn consume(&mut self, count: u64) {
        self.received += count;
        match &mut self.mode {
            BodyMode::ContentLength { remaining, .. } => *remaining -= count,
            BodyMode::Chunked(state) => {
                if let ChunkState::Data { remaining } = state {
                    *remaining -= count;
                    if *remaining == 0 {
                        *state = ChunkState::DataEnd;
                    }
                }
            }
            BodyMode::Unbounded => {}
        }
    }

    fn end_of_stream<T>(&self) -> Result<Option<T>> {
        match self.mode {
            BodyMode::Unbounded => Ok(None),
            BodyMode::ContentLength { declared, .. } => Err(self.short_body(Some(declared))),
            BodyMode::Chunked(_) => Err(self.short_body(None)),
        }
    }

    fn short_body(&self, expected: Option<u64>) -> ClientError {
        ClientError::ShortBody {
            received: self.received,
            expected,
        }
    }

    async fn read_chunk_size<S: ClientStream>(&self, channel: &mut ByteChannel<S>) -> Result<u64> {
        let mut size: u64 = 0;
        let mut digits = 0usize;
        loop {
            let Some(byte) = channel.next_byte().await? else {
                return Err(self.short_body(None));
            };
            let digit = match byte {
                b'\n' => break,
                b'\r' => continue,
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                other => return Err(ProtocolError::InvalidChunkSize(other).into()),
            };
            size = size
                .checked_mul(16)
                .and_then(|value| value.checked_add(u64::from(digit)))
                .ok_or(ProtocolError::ChunkSizeOverflow)?;
            digits += 1;
        }
        if digits == 0 {
            return Err(ProtocolError::EmptyChunkSize.into());
        }
        tracing::trace!(size, "chunk size parsed");
        Ok(size)
    }

    async fn read_chunk_terminator<S: ClientStream>(
        &self,
        channel: &mut ByteChannel<S>,
    ) -> Result<()> {
        let mut byte = channel.next_byte().await?;
        if byte == Some(b'\r') {
            byte = channel.next_byte().await?;
        }
        match byte {
            Some(b'\n') => Ok(()),
            Some(_) => Err(ProtocolError::MissingChunkTerminator.into()),
            None => Err(self.short_body(None)),
        }
    }
}

/// Skip trailer lines up to and including the empty line. End of stream here
/// still completes the body.
async fn skip_trailer<S: ClientStream>(channel: &mut ByteChannel<S>) -> Result<()> {
    let mut line_len = 0usize;
    while let Some(byte) = channel.next_byte().await? {
        match byte {
            b'\n' if line_len == 0 => return Ok(()),
            b'\n' => line_len = 0,
            b'\r' => {}
            _ => line_len += 1,
        }
    }
    Ok(())
}

fn clamp(remaining: u64) -> usize { usize::try_from(remaining).unwrap_or(usize::MAX) }
