//! Metric helpers for `osclink`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking delivered preview frames.
pub const PREVIEW_FRAMES: &str = "osclink_preview_frames_total";
/// Name of the counter tracking preview reconnects.
pub const PREVIEW_RECONNECTS: &str = "osclink_preview_reconnects_total";
/// Name of the counter tracking firmware bytes written to the socket.
pub const UPLOAD_BYTES: &str = "osclink_upload_bytes_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "osclink_errors_total";

/// Operation an error occurred in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Live preview streaming.
    Preview,
    /// Firmware upload.
    Upload,
    /// Command execution or status polling.
    Command,
}

impl Operation {
    /// Label value used on [`ERRORS_TOTAL`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Upload => "upload",
            Self::Command => "command",
        }
    }
}

/// Record a delivered preview frame.
pub fn inc_preview_frames() {
    #[cfg(feature = "metrics")]
    counter!(PREVIEW_FRAMES).increment(1);
}

/// Record a preview reconnect.
pub fn inc_preview_reconnects() {
    #[cfg(feature = "metrics")]
    counter!(PREVIEW_RECONNECTS).increment(1);
}

/// Record firmware bytes written.
pub fn inc_upload_bytes(count: u64) {
    #[cfg(feature = "metrics")]
    counter!(UPLOAD_BYTES).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Record an error surfaced by `operation`.
pub fn inc_errors(operation: Operation) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "operation" => operation.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}
