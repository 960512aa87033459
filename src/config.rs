//! Timeout and retry configuration.
//!
//! Plain value types with device-tuned defaults. Each exposes a
//! `normalized` helper that clamps accidental misconfiguration before the
//! values reach a connection or retry loop.

use std::time::Duration;

/// Path of the command execution API.
pub const COMMAND_EXECUTE_PATH: &str = "/osc/commands/execute";
/// Path of the command status API.
pub const COMMAND_STATUS_PATH: &str = "/osc/commands/status";
/// JSON body of the live-preview command.
pub const LIVE_PREVIEW_COMMAND: &str = r#"{"name":"camera.getLivePreview","parameters":{}}"#;

/// Socket timeouts applied by [`TcpConnector`](crate::transport::TcpConnector).
///
/// # Default Values
/// - `connect`: 20 seconds
/// - `idle`: 20 seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to establish the TCP connection.
    pub connect: Duration,
    /// Maximum silence between two reads before the read fails.
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(20),
            idle: Duration::from_secs(20),
        }
    }
}

impl Timeouts {
    /// Timeouts for firmware uploads: 30 s to connect and 180 s of idle time,
    /// since the device goes quiet while it writes flash.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use osclink::config::Timeouts;
    ///
    /// let upload = Timeouts::upload();
    /// assert_eq!(upload.connect, Duration::from_secs(30));
    /// assert_eq!(upload.idle, Duration::from_secs(180));
    /// ```
    #[must_use]
    pub const fn upload() -> Self {
        Self {
            connect: Duration::from_secs(30),
            idle: Duration::from_secs(180),
        }
    }

    /// Clamp both timeouts to at least one millisecond.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.connect = self.connect.max(Duration::from_millis(1));
        self.idle = self.idle.max(Duration::from_millis(1));
        self
    }
}

/// Settings for a [`PreviewSession`](crate::preview::PreviewSession).
///
/// # Default Values
/// - `path`: `/osc/commands/execute`
/// - `body`: the `camera.getLivePreview` command
/// - `attempts`: 3 request attempts per (re)connect
/// - `retry_wait`: 500 milliseconds between attempts and before reconnecting
/// - `read_buffer`: 64 KiB
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Request target of the preview command.
    pub path: String,
    /// JSON command body.
    pub body: String,
    /// `Content-Type` of the body.
    pub content_type: String,
    /// Request attempts before the session gives up.
    pub attempts: u32,
    /// Pause between failed attempts and before reconnecting.
    pub retry_wait: Duration,
    /// Capacity of the connection read buffer.
    pub read_buffer: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            path: COMMAND_EXECUTE_PATH.to_owned(),
            body: LIVE_PREVIEW_COMMAND.to_owned(),
            content_type: "application/json".to_owned(),
            attempts: 3,
            retry_wait: Duration::from_millis(500),
            read_buffer: 64 * 1024,
        }
    }
}

impl PreviewConfig {
    /// Ensure at least one attempt and a non-empty read buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::config::PreviewConfig;
    ///
    /// let cfg = PreviewConfig {
    ///     attempts: 0,
    ///     read_buffer: 0,
    ///     ..PreviewConfig::default()
    /// };
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.attempts, 1);
    /// assert_eq!(normalized.read_buffer, 1);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.attempts = self.attempts.max(1);
        self.read_buffer = self.read_buffer.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_defaults_match_device_tuning() {
        let cfg = PreviewConfig::default();
        assert_eq!(cfg.attempts, 3);
        assert_eq!(cfg.retry_wait, Duration::from_millis(500));
        assert_eq!(cfg.body, r#"{"name":"camera.getLivePreview","parameters":{}}"#);
    }

    #[test]
    fn timeouts_are_clamped() {
        let timeouts = Timeouts {
            connect: Duration::ZERO,
            idle: Duration::ZERO,
        }
        .normalized();
        assert_eq!(timeouts.connect, Duration::from_millis(1));
        assert_eq!(timeouts.idle, Duration::from_millis(1));
    }
}
