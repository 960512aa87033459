//! RFC 2617 digest authentication.
//!
//! A [`DigestAuthenticator`] owns a credential and the most recent server
//! challenge. It is shared through `Arc` by every request path talking to the
//! same device; the challenge sits behind a lock and is replaced whenever a
//! 401 response carries a fresh one.

use std::sync::{PoisonError, RwLock};

use md5::{Digest, Md5};
use uuid::Uuid;

use crate::error::{AuthFailure, Result};

mod challenge;

pub use challenge::{DEFAULT_QOP, DigestChallenge};

/// Nonce count; every request uses a fresh cnonce instead of incrementing.
pub const NONCE_COUNT: &str = "00000001";

const SERIAL_PREFIX: &str = "THETA";
const SERIAL_PREFIX_LEN: usize = SERIAL_PREFIX.len() + 2;

/// Username and password for digest authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct DigestCredential {
    username: String,
    password: String,
}

impl DigestCredential {
    /// Create a credential. Without an explicit password, a username of the
    /// form `THETAxx<serial>` yields `<serial>`; any other username gets an
    /// empty password.
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::auth::DigestCredential;
    ///
    /// let credential = DigestCredential::new("THETAYL00105377", None);
    /// assert_eq!(credential.password(), "00105377");
    ///
    /// let credential = DigestCredential::new("admin", None);
    /// assert_eq!(credential.password(), "");
    /// ```
    #[must_use]
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        let username = username.into();
        let password = password.unwrap_or_else(|| default_password(&username));
        Self { username, password }
    }

    /// Username sent in the header.
    #[must_use]
    pub fn username(&self) -> &str { &self.username }

    /// Password mixed into `A1`.
    #[must_use]
    pub fn password(&self) -> &str { &self.password }
}

impl std::fmt::Debug for DigestCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_password(username: &str) -> String {
    if username.starts_with(SERIAL_PREFIX) && username.len() > SERIAL_PREFIX_LEN {
        username.get(SERIAL_PREFIX_LEN..).unwrap_or_default().to_owned()
    } else {
        String::new()
    }
}

/// Computes `Authorization: Digest` headers for one credential.
#[derive(Debug)]
pub struct DigestAuthenticator {
    credential: DigestCredential,
    challenge: RwLock<Option<DigestChallenge>>,
}

impl DigestAuthenticator {
    /// Create an authenticator with no challenge recorded yet.
    #[must_use]
    pub fn new(credential: DigestCredential) -> Self {
        Self {
            credential,
            challenge: RwLock::new(None),
        }
    }

    /// The configured credential.
    #[must_use]
    pub fn credential(&self) -> &DigestCredential { &self.credential }

    /// The most recent challenge, if any.
    #[must_use]
    pub fn challenge(&self) -> Option<DigestChallenge> {
        self.challenge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the stored challenge.
    pub fn set_challenge(&self, challenge: DigestChallenge) {
        *self
            .challenge
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(challenge);
    }

    /// Record the challenge carried by a 401 response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Authentication`](crate::ClientError::Authentication)
    /// when the header is absent or unusable; the previous challenge is kept
    /// in that case.
    pub fn on_unauthorized(&self, www_authenticate: Option<&str>) -> Result<()> {
        let header = www_authenticate.ok_or_else(|| {
            AuthFailure::MalformedChallenge("missing WWW-Authenticate header".to_owned())
        })?;
        let challenge = DigestChallenge::parse(header)?;
        tracing::debug!(realm = challenge.realm(), "digest challenge recorded");
        self.set_challenge(challenge);
        Ok(())
    }

    /// `Authorization` header value for `method` on `uri`, using a fresh
    /// random cnonce. Before any challenge the realm and nonce are empty.
    #[must_use]
    pub fn header_for(&self, uri: &str, method: &str) -> String {
        let cnonce = Uuid::new_v4().simple().to_string();
        self.header_with_cnonce(uri, method, &cnonce)
    }

    /// Deterministic variant of [`header_for`](Self::header_for).
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::auth::{DigestAuthenticator, DigestChallenge, DigestCredential};
    ///
    /// let auth = DigestAuthenticator::new(DigestCredential::new(
    ///     "Mufasa",
    ///     Some("Circle Of Life".to_owned()),
    /// ));
    /// auth.set_challenge(DigestChallenge::new(
    ///     "testrealm@host.com",
    ///     "dcd98b7102dd2f0e8b11d0f600bfb0c093",
    /// ));
    /// let header = auth.header_with_cnonce("/dir/index.html", "GET", "0a4f113b");
    /// assert!(header.ends_with(r#"response="6629fae49393a05397450978507c4ef1""#));
    /// ```
    #[must_use]
    pub fn header_with_cnonce(&self, uri: &str, method: &str, cnonce: &str) -> String {
        let challenge = self.challenge();
        let (realm, nonce, qop, opaque) = challenge.as_ref().map_or(
            ("", "", DEFAULT_QOP, None),
            |c| (c.realm(), c.nonce(), c.qop(), c.opaque()),
        );
        let username = self.credential.username();

        let a1 = hex_md5(&[username, realm, self.credential.password()]);
        let a2 = hex_md5(&[method, uri]);
        let response = hex_md5(&[&a1, nonce, NONCE_COUNT, cnonce, qop, &a2]);

        let mut header = format!(
            r#"Digest username="{username}", realm="{realm}", uri="{uri}", nonce="{nonce}", nc={NONCE_COUNT}, qop="{qop}", cnonce="{cnonce}", response="{response}""#
        );
        if let Some(opaque) = opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }
        header
    }
}

/// Lower-case hex MD5 of `parts` joined with `:`.
fn hex_md5(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            hasher.update(b":");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests;
