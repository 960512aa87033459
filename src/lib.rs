#![doc(html_root_url = "https://docs.rs/osclink/latest")]
//! Public API for the `osclink` library.
//!
//! This crate speaks the HTTP API of 360° cameras over plain TCP: it decodes
//! content-length and chunked bodies, answers digest challenges, streams
//! the `multipart/x-mixed-replace` live preview with automatic reconnect,
//! uploads firmware as `multipart/form-data`, and polls asynchronous
//! commands to completion.

pub mod auth;
pub mod command;
pub mod config;
pub mod endpoint;
pub mod error;
mod exchange;
pub mod http;
pub mod metrics;
pub mod multipart;
pub mod preview;
pub mod transport;
pub mod upload;

pub use auth::{DigestAuthenticator, DigestCredential};
pub use command::{CommandClient, CommandPoller, CommandResponse, CommandState, StatusSource};
pub use endpoint::Endpoint;
/// Result type alias re-exported for convenience.
pub use error::Result;
pub use error::{AuthFailure, ClientError, ProtocolError};
pub use preview::{PreviewSession, SessionPhase};
pub use transport::{ByteChannel, ClientStream, Connector, TcpConnector};
pub use upload::FirmwareUploader;
