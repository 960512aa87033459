//! Tests for Display implementations on error types.

use std::{io, time::Duration};

use bytes::Bytes;
use osclink::{AuthFailure, ClientError, ProtocolError, http::Headers};

#[test]
fn protocol_error_messages() {
    assert_eq!(
        ProtocolError::InvalidChunkSize(b'g').to_string(),
        "invalid character in chunk size: 0x67"
    );
    assert_eq!(
        ProtocolError::BadStatusLine("HTTP/1.1".to_owned()).to_string(),
        "malformed status line: \"HTTP/1.1\""
    );
    assert_eq!(
        ClientError::from(ProtocolError::MissingChunkTerminator).to_string(),
        "malformed response: chunk data not terminated by CRLF"
    );
}

#[test]
fn client_error_messages() {
    let connect = ClientError::Connect {
        host: "192.168.1.1".to_owned(),
        port: 80,
        source: io::Error::from(io::ErrorKind::ConnectionRefused),
    };
    assert_eq!(connect.to_string(), "failed to connect to 192.168.1.1:80");

    assert_eq!(
        ClientError::IdleTimeout(Duration::from_secs(20)).to_string(),
        "no data received for 20s"
    );
    assert_eq!(
        ClientError::ShortBody {
            received: 3,
            expected: Some(10)
        }
        .to_string(),
        "response body ended early after 3 bytes (expected Some(10))"
    );
    assert_eq!(
        ClientError::from(AuthFailure::Rejected).to_string(),
        "authentication failed: credentials rejected by device"
    );
    assert_eq!(
        ClientError::Status {
            status: 503,
            reason: "Service Unavailable".to_owned(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
        .to_string(),
        "HTTP 503 Service Unavailable"
    );
}

#[test]
fn preview_unavailable_keeps_its_cause() {
    let err = ClientError::PreviewUnavailable {
        attempts: 3,
        source: Box::new(ClientError::Disconnected),
    };
    assert_eq!(err.to_string(), "live preview unavailable after 3 attempts");
    let source = std::error::Error::source(&err).expect("cause");
    assert_eq!(
        source.to_string(),
        "connection closed before a complete response head was received"
    );
}

#[test]
fn transient_classification() {
    assert!(ClientError::Disconnected.is_transient());
    assert!(ClientError::IdleTimeout(Duration::from_secs(1)).is_transient());
    assert!(!ClientError::from(AuthFailure::NoCredentials).is_transient());
    assert!(
        !ClientError::PathNotFound {
            path: "/x".to_owned()
        }
        .is_transient()
    );
    assert!(!ClientError::Cancelled.is_transient());
}
