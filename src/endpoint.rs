//! Target URL parsing.

use std::fmt;

use crate::error::{ClientError, Result};

/// URL scheme of an [`Endpoint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP over TCP.
    Http,
    /// HTTP over TLS. Parsed for diagnostics; connectors refuse it.
    Https,
}

impl Scheme {
    /// Port used when the URL names none.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    /// Lower-case scheme name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// A parsed `scheme://host[:port][/path]` URL.
///
/// # Examples
///
/// ```
/// use osclink::endpoint::{Endpoint, Scheme};
///
/// let endpoint: Endpoint = "http://192.168.1.1/".parse().expect("valid endpoint");
/// assert_eq!(endpoint.scheme(), Scheme::Http);
/// assert_eq!(endpoint.host(), "192.168.1.1");
/// assert_eq!(endpoint.port(), 80);
/// assert_eq!(endpoint.path(), "/");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] when the scheme is not
    /// `http`/`https`, the host is empty, or the port is not a number.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason| ClientError::InvalidEndpoint {
            url: url.to_owned(),
            reason,
        };
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let scheme = if scheme.eq_ignore_ascii_case("http") {
            Scheme::Http
        } else if scheme.eq_ignore_ascii_case("https") {
            Scheme::Https
        } else {
            return Err(invalid("scheme must be http or https"));
        };

        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, "/"),
        };
        // A bracketed IPv6 literal only carries a port after its closing `]`.
        let port_at = match authority.rfind(']') {
            Some(close) => authority[close..].find(':').map(|index| close + index),
            None if authority.contains('[') => return Err(invalid("unterminated IPv6 literal")),
            None => authority.rfind(':'),
        };
        let (host, port) = match port_at {
            Some(index) => {
                let port = authority[index + 1..]
                    .parse()
                    .map_err(|_| invalid("port is not a number"))?;
                (&authority[..index], port)
            }
            None => (authority, scheme.default_port()),
        };
        if host == "[]" {
            return Err(invalid("missing host"));
        }
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme,
            host: host.to_owned(),
            port,
            path: path.to_owned(),
        })
    }

    /// URL scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme { self.scheme }

    /// Host name or address literal. IPv6 literals keep their brackets.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Host as passed to name resolution, without IPv6 brackets.
    #[must_use]
    pub fn resolve_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Path and query, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Request target for `path` below this endpoint's base path.
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::endpoint::Endpoint;
    ///
    /// let root = Endpoint::parse("http://192.168.1.1/").expect("valid endpoint");
    /// assert_eq!(root.join("osc/commands/execute"), "/osc/commands/execute");
    ///
    /// let proxied = Endpoint::parse("http://gateway/camera1/").expect("valid endpoint");
    /// assert_eq!(proxied.join("/osc/info"), "/camera1/osc/info");
    /// ```
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        let base = self.path.trim_end_matches('/');
        format!("{base}{}", normalize_path(path))
    }

    /// Value for the `Host` request header; the port is included only when it
    /// differs from the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

/// Prefix `path` with `/` when it lacks one.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
