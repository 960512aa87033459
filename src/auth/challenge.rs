//! `WWW-Authenticate: Digest` challenge parsing.

use crate::error::AuthFailure;

/// Quality of protection used when the challenge names none.
pub const DEFAULT_QOP: &str = "auth";

/// Server parameters from a digest challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestChallenge {
    realm: String,
    nonce: String,
    qop: String,
    opaque: Option<String>,
}

impl DigestChallenge {
    /// Challenge with the default `qop` and no opaque value.
    #[must_use]
    pub fn new(realm: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            nonce: nonce.into(),
            qop: DEFAULT_QOP.to_owned(),
            opaque: None,
        }
    }

    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Parameter values may be quoted (commas and escaped quotes allowed) or
    /// bare tokens. `realm` and `nonce` are required. When `qop` lists
    /// several options `auth` is chosen; `auth-int` alone is unsupported.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure::MalformedChallenge`] when the scheme is not
    /// `Digest`, a required parameter is missing, or the algorithm or qop
    /// cannot be honoured.
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::auth::DigestChallenge;
    ///
    /// let challenge = DigestChallenge::parse(
    ///     r#"Digest realm="RICOH THETA Z1", nonce="3e1f8fbd6b0f9d2a", qop="auth,auth-int""#,
    /// )
    /// .expect("valid challenge");
    /// assert_eq!(challenge.realm(), "RICOH THETA Z1");
    /// assert_eq!(challenge.qop(), "auth");
    /// ```
    pub fn parse(header: &str) -> Result<Self, AuthFailure> {
        let malformed = |reason: &str| AuthFailure::MalformedChallenge(reason.to_owned());
        let header = header.trim_start();
        let (scheme, params) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(malformed("scheme is not Digest"));
        }

        let (mut realm, mut nonce, mut qop, mut opaque) = (None, None, None, None);
        for (key, value) in Params::new(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" if !value.eq_ignore_ascii_case("md5") => {
                    return Err(AuthFailure::MalformedChallenge(format!(
                        "unsupported algorithm {value:?}"
                    )));
                }
                _ => {}
            }
        }

        let qop = match qop {
            None => DEFAULT_QOP.to_owned(),
            Some(list) if list.split(',').any(|q| q.trim() == DEFAULT_QOP) => {
                DEFAULT_QOP.to_owned()
            }
            Some(list) => {
                return Err(AuthFailure::MalformedChallenge(format!(
                    "unsupported qop {list:?}"
                )));
            }
        };

        Ok(Self {
            realm: realm.ok_or_else(|| malformed("missing realm"))?,
            nonce: nonce.ok_or_else(|| malformed("missing nonce"))?,
            qop,
            opaque,
        })
    }

    /// Protection space.
    #[must_use]
    pub fn realm(&self) -> &str { &self.realm }

    /// Server nonce.
    #[must_use]
    pub fn nonce(&self) -> &str { &self.nonce }

    /// Selected quality of protection.
    #[must_use]
    pub fn qop(&self) -> &str { &self.qop }

    /// Opaque value to echo back, if the server sent one.
    #[must_use]
    pub fn opaque(&self) -> Option<&str> { self.opaque.as_deref() }
}

/// Iterator over `key=value` pairs of a challenge parameter list.
struct Params<'a> {
    rest: &'a str,
}

impl<'a> Params<'a> {
    fn new(rest: &'a str) -> Self { Self { rest } }
}

impl Iterator for Params<'_> {
    type Item = (String, String);

    fn next(&mut self) -> Option<Self::Item> {
        let mut rest = self.rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        // Bare tokens without a value are skipped.
        let (key, after) = loop {
            match rest.find([',', '=']) {
                Some(index) if rest.as_bytes()[index] == b',' => {
                    rest = rest[index..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
                }
                Some(index) => break (&rest[..index], &rest[index + 1..]),
                None => {
                    self.rest = "";
                    return None;
                }
            }
        };
        let key = key.trim().to_owned();
        let after = after.trim_start();

        let value = if let Some(quoted) = after.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = quoted.len();
            while let Some((index, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = index + 1;
                        break;
                    }
                    other => value.push(other),
                }
            }
            self.rest = &quoted[end..];
            value
        } else {
            let end = after.find(',').unwrap_or(after.len());
            self.rest = &after[end..];
            after[..end].trim().to_owned()
        };
        Some((key, value))
    }
}
