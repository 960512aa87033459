//! Boundary-delimited part reader for the live-preview stream.

use bytes::{Bytes, BytesMut};

use crate::{
    error::{ClientError, ProtocolError, Result},
    http::{Headers, HttpConnection, ResponseHead},
    transport::ClientStream,
};

/// Extract the `boundary=` parameter from a `Content-Type` value.
///
/// The value may be quoted and is limited to the characters
/// `0-9 a-z A-Z ' ( ) + _ , - . / : = ?` and space.
///
/// # Examples
///
/// ```
/// use osclink::multipart::boundary_from_content_type;
///
/// assert_eq!(
///     boundary_from_content_type(r#"multipart/x-mixed-replace; boundary="---osclivepreview---""#)
///         .as_deref(),
///     Some("---osclivepreview---"),
/// );
/// assert_eq!(boundary_from_content_type("image/jpeg"), None);
/// ```
#[must_use]
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    const KEY: &str = "boundary=";
    let start = content_type
        .to_ascii_lowercase()
        .find(KEY)
        .map(|index| index + KEY.len())?;
    let value = content_type[start..].trim_start_matches('"');
    let end = value
        .find(|c: char| !is_boundary_char(c))
        .unwrap_or(value.len());
    let boundary = value[..end].trim_end();
    (!boundary.is_empty()).then(|| boundary.to_owned())
}

fn is_boundary_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}

/// One part of a multipart response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePart {
    headers: Headers,
    length: usize,
    payload: Bytes,
}

impl FramePart {
    /// Part headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Declared `Content-Length`.
    #[must_use]
    pub const fn length(&self) -> usize { self.length }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Take the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

/// Reads boundary-delimited parts from a response body.
///
/// Separator lines are accepted as `boundary`, `--boundary` or
/// `--boundary--`; the device does not reliably send the leading hyphens.
/// Each part must be consumed before the next one is requested, which the
/// `&mut self` receiver enforces.
#[derive(Debug)]
pub struct MultipartReader<S> {
    conn: HttpConnection<S>,
    boundary: Option<String>,
    buffer: BytesMut,
}

impl<S: ClientStream> MultipartReader<S> {
    /// Read parts from `conn` separated by `boundary`. Without a boundary no
    /// part is ever produced.
    pub fn new(conn: HttpConnection<S>, boundary: Option<String>) -> Self {
        Self {
            conn,
            boundary,
            buffer: BytesMut::new(),
        }
    }

    /// Read parts using the boundary announced by `head`.
    pub fn from_response(conn: HttpConnection<S>, head: &ResponseHead) -> Self {
        Self::new(conn, head.boundary())
    }

    /// Negotiated boundary.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> { self.boundary.as_deref() }

    /// Next part, or `None` when the stream ended, no boundary was
    /// negotiated, or the part carries no usable `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ShortBody`] when the payload is cut short and
    /// propagates transport and framing errors.
    pub async fn next_part(&mut self) -> Result<Option<FramePart>> {
        let Some(boundary) = self.boundary.as_deref() else {
            return Ok(None);
        };
        loop {
            let Some(line) = self.conn.next_line().await? else {
                return Ok(None);
            };
            if is_separator(line.trim_end(), boundary) {
                break;
            }
        }

        let mut headers = Headers::new();
        loop {
            let Some(line) = self.conn.next_line().await? else {
                return Ok(None);
            };
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim(), value.trim());
            }
        }

        let length = match headers.get("content-length") {
            None => return Ok(None),
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(value.to_owned()))?,
        };
        if length == 0 {
            return Ok(None);
        }

        let read = self.conn.read_into(&mut self.buffer, length).await?;
        if read < length {
            self.buffer.clear();
            return Err(ClientError::ShortBody {
                received: read as u64,
                expected: Some(length as u64),
            });
        }
        tracing::trace!(length, "multipart part read");
        Ok(Some(FramePart {
            headers,
            length,
            payload: self.buffer.split().freeze(),
        }))
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&mut self) { self.conn.close().await; }

    /// Return the underlying connection.
    pub fn into_inner(self) -> HttpConnection<S> { self.conn }
}

fn is_separator(line: &str, boundary: &str) -> bool {
    line == boundary
        || line
            .strip_prefix("--")
            .is_some_and(|rest| rest == boundary || rest.strip_suffix("--") == Some(boundary))
}
