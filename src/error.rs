//! Canonical error and result types for the crate.
//!
//! [`ClientError`] is the single public error surface. Wire-level violations
//! are grouped under [`ProtocolError`] and authentication causes under
//! [`AuthFailure`], so callers can tell "device unreachable" from "device
//! rejected the request" from "the protocol was violated".

use std::{io, path::PathBuf, time::Duration};

use bytes::Bytes;
use thiserror::Error;

use crate::http::Headers;

/// Violations of the HTTP framing rules the client relies on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The status line did not match `HTTP/<version> <code> <reason>`.
    #[error("malformed status line: {0:?}")]
    BadStatusLine(String),

    /// A header line had no `name: value` structure.
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),

    /// A header line started with whitespace (RFC 7230 obs-fold).
    #[error("obsolete header line folding: {0:?}")]
    ObsoleteLineFolding(String),

    /// The `Content-Length` header was not a decimal number.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A byte outside `[0-9a-fA-F\r\n]` appeared in a chunk-size line.
    #[error("invalid character in chunk size: {0:#04x}")]
    InvalidChunkSize(u8),

    /// A chunk-size line carried no digits.
    #[error("empty chunk size line")]
    EmptyChunkSize,

    /// The chunk size does not fit in 64 bits.
    #[error("chunk size overflows")]
    ChunkSizeOverflow,

    /// Chunk data was not followed by CRLF.
    #[error("chunk data not terminated by CRLF")]
    MissingChunkTerminator,

    /// An in-progress command response carried no command id to poll.
    #[error("in-progress command response has no id")]
    MissingCommandId,
}

/// Reasons digest authentication could not proceed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthFailure {
    /// The device answered 401 but no credentials were configured.
    #[error("device requires authentication but no credentials are configured")]
    NoCredentials,

    /// The 401 response had no usable `WWW-Authenticate` digest challenge.
    #[error("unusable digest challenge: {0}")]
    MalformedChallenge(String),

    /// The authenticated retry was answered with 401 again.
    #[error("credentials rejected by device")]
    Rejected,
}

/// Errors emitted by the transport, HTTP and session layers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint {
        /// The URL as supplied.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The endpoint uses a scheme this client cannot speak (TLS).
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    /// The host could not be reached within the connect timeout.
    #[error("failed to connect to {host}:{port}")]
    Connect {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Underlying cause; `TimedOut` when the connect timeout elapsed.
        #[source]
        source: io::Error,
    },

    /// No byte arrived within the idle-read timeout.
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    /// The peer closed the connection before a complete response head.
    #[error("connection closed before a complete response head was received")]
    Disconnected,

    /// The response violated HTTP framing.
    #[error("malformed response: {0}")]
    Protocol(#[from] ProtocolError),

    /// The body ended before the length implied by its head.
    #[error("response body ended early after {received} bytes (expected {expected:?})")]
    ShortBody {
        /// Bytes consumed before the stream ended.
        received: u64,
        /// Declared length, when one was declared.
        expected: Option<u64>,
    },

    /// Digest authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthFailure),

    /// Every live-preview request attempt failed.
    #[error("live preview unavailable after {attempts} attempts")]
    PreviewUnavailable {
        /// Number of attempts made.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: Box<ClientError>,
    },

    /// The device answered 404: the API path is wrong.
    #[error("API path not found: {path}")]
    PathNotFound {
        /// Request target that was rejected.
        path: String,
    },

    /// The device answered with an unexpected status.
    #[error("HTTP {status} {reason}")]
    Status {
        /// Status code.
        status: u16,
        /// Reason phrase.
        reason: String,
        /// Response headers, for diagnostics.
        headers: Headers,
        /// Response body, possibly empty, for diagnostics.
        body: Bytes,
    },

    /// The device reported a command-level error.
    #[error("device error {code}: {message}")]
    DeviceApi {
        /// Device error code.
        code: String,
        /// Device error message.
        message: String,
    },

    /// A firmware upload was requested without any file.
    #[error("no firmware files to upload")]
    NoUploadFiles,

    /// A firmware file could not be inspected or read.
    #[error("cannot read upload file {path:?}")]
    UploadFile {
        /// Offending path.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// A command payload could not be encoded or decoded.
    #[error("invalid command payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport error outside connect and idle handling.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The operation was cancelled by its owner.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Returns `true` for failures a retry loop may reasonably try again:
    /// reachability, timeouts and wire-level breakage. Authentication,
    /// wrong API paths and caller mistakes are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::IdleTimeout(_)
                | Self::Disconnected
                | Self::Protocol(_)
                | Self::ShortBody { .. }
                | Self::Status { .. }
                | Self::Io(_)
        )
    }

    pub(crate) fn connect(host: &str, port: u16, source: io::Error) -> Self {
        Self::Connect {
            host: host.to_owned(),
            port,
            source,
        }
    }
}

/// Canonical result alias used by `osclink` public APIs.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;
