//! Status-line and header-line parsing.

use super::{BodyMode, Headers};
use crate::{error::ProtocolError, multipart::boundary_from_content_type};

/// Coarse classification of a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 401: retry with digest credentials.
    Unauthorized,
    /// 404: the API path is wrong.
    NotFound,
    /// Anything else.
    Other,
}

/// A parsed status line and header block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    status: u16,
    reason: String,
    headers: Headers,
    chunked: bool,
    content_length: Option<u64>,
}

impl ResponseHead {
    /// Build a head from its parsed parts, deriving the body framing.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidContentLength`] when `content-length`
    /// is not a decimal number.
    pub fn new(status: u16, reason: String, headers: Headers) -> Result<Self, ProtocolError> {
        let chunked = headers.get("transfer-encoding").is_some_and(|value| {
            value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        });
        let content_length = headers
            .get("content-length")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidContentLength(value.to_owned()))
            })
            .transpose()?;
        Ok(Self {
            status,
            reason,
            headers,
            chunked,
            content_length,
        })
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 { self.status }

    /// Reason phrase, possibly empty.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    /// Value of header `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.headers.get(name) }

    /// Whether the body uses chunked transfer encoding.
    #[must_use]
    pub const fn is_chunked(&self) -> bool { self.chunked }

    /// Declared `Content-Length`, if any.
    #[must_use]
    pub const fn content_length(&self) -> Option<u64> { self.content_length }

    /// Coarse status classification.
    #[must_use]
    pub const fn class(&self) -> StatusClass {
        match self.status {
            200..=299 => StatusClass::Success,
            401 => StatusClass::Unauthorized,
            404 => StatusClass::NotFound,
            _ => StatusClass::Other,
        }
    }

    /// Multipart boundary announced by `Content-Type`, if any.
    #[must_use]
    pub fn boundary(&self) -> Option<String> {
        self.header("content-type").and_then(boundary_from_content_type)
    }

    /// Body framing implied by this head. Chunked encoding wins over a
    /// conflicting `Content-Length`.
    #[must_use]
    pub const fn body_mode(&self) -> BodyMode {
        if self.chunked {
            BodyMode::chunked()
        } else if let Some(length) = self.content_length {
            BodyMode::content_length(length)
        } else {
            BodyMode::Unbounded
        }
    }
}

/// Parse `HTTP/<version> <code>[ <reason>]`.
pub(crate) fn parse_status_line(line: &str) -> Result<(u16, String), ProtocolError> {
    let bad = || ProtocolError::BadStatusLine(line.to_owned());
    let rest = line.strip_prefix("HTTP/").ok_or_else(bad)?;
    let (version, rest) = rest.split_once(' ').ok_or_else(bad)?;
    if version.is_empty() {
        return Err(bad());
    }
    let rest = rest.trim_start();
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let status = code.parse().map_err(|_| bad())?;
    Ok((status, reason.trim().to_owned()))
}

/// Parse one `Name: Value` header line.
pub(crate) fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    if line.starts_with([' ', '\t']) {
        return Err(ProtocolError::ObsoleteLineFolding(line.to_owned()));
    }
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::MalformedHeader(line.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ProtocolError::MalformedHeader(line.to_owned()));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}
