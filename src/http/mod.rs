//! Minimal HTTP/1.1 message layer.
//!
//! Requests are written as a request line plus headers; responses are read
//! as a [`ResponseHead`] followed by a body decoded according to its
//! [`BodyMode`]. There is no connection reuse: each [`HttpConnection`] serves
//! one exchange.

use std::{collections::BTreeMap, fmt};

mod body;
mod connection;
mod head;

pub use body::{BodyMode, ChunkState};
pub use connection::{HttpConnection, LINE_BUFFER};
pub use head::{ResponseHead, StatusClass};

/// Header map keyed by lower-cased name.
///
/// Repeated headers are joined with `", "`.
///
/// # Examples
///
/// ```
/// use osclink::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "image/jpeg");
/// assert_eq!(headers.get("content-type"), Some("image/jpeg"));
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("image/jpeg"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add a header, appending to any existing value of the same name.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.0
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }

    /// Value of `name`, matched case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` when no header is present.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Request line and headers of an outgoing request.
///
/// Headers are written in insertion order with their original casing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    method: &'static str,
    path: String,
    headers: Vec<(&'static str, String)>,
}

impl RequestHead {
    /// Start a request for `method` on `path`.
    #[must_use]
    pub fn new(method: &'static str, path: &str) -> Self {
        Self {
            method,
            path: path.to_owned(),
            headers: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Append a header when `value` is present.
    #[must_use]
    pub fn header_opt(self, name: &'static str, value: Option<String>) -> Self {
        match value {
            Some(value) => self.header(name, value),
            None => self,
        }
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &'static str { self.method }

    /// Request target as given.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Value of the first header called `name`, matched case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn headers(&self) -> &[(&'static str, String)] { &self.headers }
}

impl fmt::Display for RequestHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
