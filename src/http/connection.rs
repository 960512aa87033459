//! Request writing and response reading over one [`ByteChannel`].

use bytes::{Bytes, BytesMut};

use super::{
    BodyMode,
    Headers,
    RequestHead,
    ResponseHead,
    body::BodyDecoder,
    head::{parse_header_line, parse_status_line},
};
use crate::{
    endpoint::normalize_path,
    error::{ClientError, Result},
    transport::{ByteChannel, ClientStream},
};

/// Longest line returned by [`HttpConnection::next_line`]; longer lines are
/// returned in pieces of this size.
pub const LINE_BUFFER: usize = 1024;

const BODY_SLICE: usize = 8 * 1024;
const RESERVE_LIMIT: usize = 64 * 1024;

/// One HTTP exchange over an owned channel.
///
/// Before a response head has been read the decoder runs in
/// [`BodyMode::Unbounded`], so head lines are read straight from the stream.
/// [`read_response_head`](Self::read_response_head) then switches to the
/// framing the head announces.
#[derive(Debug)]
pub struct HttpConnection<S> {
    channel: ByteChannel<S>,
    body: BodyDecoder,
}

impl<S: ClientStream> HttpConnection<S> {
    /// Wrap an open channel.
    pub fn new(channel: ByteChannel<S>) -> Self {
        Self {
            channel,
            body: BodyDecoder::new(BodyMode::Unbounded),
        }
    }

    /// Framing of the body currently being read.
    #[must_use]
    pub fn body_mode(&self) -> BodyMode { self.body.mode() }

    /// Body bytes consumed since the last response head.
    #[must_use]
    pub fn body_received(&self) -> u64 { self.body.received() }

    /// Write `METHOD SP path SP HTTP/1.1 CRLF`, prefixing `path` with `/` if
    /// needed.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn write_request_line(&mut self, method: &str, path: &str) -> Result<()> {
        self.channel
            .write_all(request_line(method, path).as_bytes())
            .await
    }

    /// Write `Name: Value` lines followed by the blank line ending the head.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn write_headers<I, N, V>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut block = String::new();
        push_headers(&mut block, headers);
        self.channel.write_all(block.as_bytes()).await
    }

    /// Write a complete request head in one write.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn send_head(&mut self, head: &RequestHead) -> Result<()> {
        let mut block = request_line(head.method(), head.path());
        push_headers(
            &mut block,
            head.headers()
                .iter()
                .map(|(name, value)| (*name, value.as_str())),
        );
        tracing::debug!(request = %head, "sending request head");
        self.channel.write_all(block.as_bytes()).await
    }

    /// Write raw body bytes.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.channel.write_all(bytes).await
    }

    /// Read the status line and header block, then select the body framing.
    /// Empty lines before the status line are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] if the stream ends before the head
    /// is complete and [`ClientError::Protocol`] for malformed lines.
    pub async fn read_response_head(&mut self) -> Result<ResponseHead> {
        self.body.reset(BodyMode::Unbounded);
        let status_line = loop {
            match self.next_line().await? {
                None => return Err(ClientError::Disconnected),
                Some(line) if line.is_empty() => {}
                Some(line) => break line,
            }
        };
        let (status, reason) = parse_status_line(&status_line)?;

        let mut headers = Headers::new();
        loop {
            let line = self.next_line().await?.ok_or(ClientError::Disconnected)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = parse_header_line(&line)?;
            headers.insert(&name, &value);
        }

        let head = ResponseHead::new(status, reason, headers)?;
        self.body.reset(head.body_mode());
        tracing::debug!(
            status = head.status(),
            chunked = head.is_chunked(),
            content_length = ?head.content_length(),
            "response head parsed"
        );
        Ok(head)
    }

    /// Next body byte, or `None` once the body is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ShortBody`] on early end of stream and
    /// [`ClientError::Protocol`] for malformed chunk framing.
    pub async fn next_byte(&mut self) -> Result<Option<u8>> {
        self.body.next_byte(&mut self.channel).await
    }

    /// Up to `max` body bytes, or `None` once the body is exhausted.
    ///
    /// # Errors
    ///
    /// See [`next_byte`](Self::next_byte).
    pub async fn next_slice(&mut self, max: usize) -> Result<Option<Bytes>> {
        self.body.next_slice(&mut self.channel, max).await
    }

    /// Next body line without its terminator. `\r` is dropped, bytes are
    /// decoded lossily, and lines longer than [`LINE_BUFFER`] are split.
    /// Returns `None` when the body ends with no pending bytes.
    ///
    /// # Errors
    ///
    /// See [`next_byte`](Self::next_byte).
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::with_capacity(64);
        loop {
            match self.next_byte().await? {
                Some(b'\n') => break,
                Some(b'\r') => {}
                Some(byte) => {
                    line.push(byte);
                    if line.len() == LINE_BUFFER {
                        break;
                    }
                }
                None if line.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Append up to `count` body bytes to `buf`. Returns how many were
    /// appended; fewer than `count` only when the body ended.
    ///
    /// # Errors
    ///
    /// See [`next_byte`](Self::next_byte).
    pub async fn read_into(&mut self, buf: &mut BytesMut, count: usize) -> Result<usize> {
        buf.reserve(count.min(RESERVE_LIMIT));
        let mut read = 0;
        while read < count {
            let Some(bytes) = self.next_slice(count - read).await? else {
                break;
            };
            read += bytes.len();
            buf.extend_from_slice(&bytes);
        }
        Ok(read)
    }

    /// Drain the rest of the body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ShortBody`] when a length-delimited body ends
    /// early.
    pub async fn read_body(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(bytes) = self.next_slice(BODY_SLICE).await? {
            body.extend_from_slice(&bytes);
        }
        Ok(body.freeze())
    }

    /// Close the underlying channel. Idempotent.
    pub async fn close(&mut self) { self.channel.close().await; }
}

fn request_line(method: &str, path: &str) -> String {
    format!("{method} {} HTTP/1.1\r\n", normalize_path(path))
}

fn push_headers<I, N, V>(block: &mut String, headers: I)
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: AsRef<str>,
{
    for (name, value) in headers {
        block.push_str(name.as_ref());
        block.push_str(": ");
        block.push_str(value.as_ref());
        block.push_str("\r\n");
    }
    block.push_str("\r\n");
}
