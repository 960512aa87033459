//! Live-preview session.
//!
//! A [`PreviewSession`] posts the live-preview command, reads the
//! `multipart/x-mixed-replace` response as a sequence of frames and
//! transparently reopens the stream when the device ends it or the
//! connection breaks. The session moves through
//! `Idle → Requesting → Streaming → (Idle | Stopped)`; `Stopped` is final.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::DigestAuthenticator,
    config::PreviewConfig,
    endpoint::Endpoint,
    error::{ClientError, Result},
    exchange::{BodyRequest, Exchange},
    metrics::{self, Operation},
    multipart::{FramePart, MultipartReader},
    transport::Connector,
};

/// Observable phase of a [`PreviewSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// No request in flight.
    Idle,
    /// Posting the preview command.
    Requesting,
    /// Reading frames from an open stream.
    Streaming,
    /// Stopped for good.
    Stopped,
}

enum SessionState<S> {
    Idle { reconnect: bool },
    Requesting,
    Streaming(MultipartReader<S>),
    Stopped,
}

impl<S> SessionState<S> {
    const fn phase(&self) -> SessionPhase {
        match self {
            Self::Idle { .. } => SessionPhase::Idle,
            Self::Requesting => SessionPhase::Requesting,
            Self::Streaming(_) => SessionPhase::Streaming,
            Self::Stopped => SessionPhase::Stopped,
        }
    }
}

/// Pull-based live-preview stream with automatic reconnect.
///
/// Frames are returned in arrival order. A frame must be taken before the
/// next one is requested, so at most one part is ever buffered.
///
/// # Examples
///
/// ```no_run
/// use osclink::{
///     config::PreviewConfig,
///     endpoint::Endpoint,
///     preview::PreviewSession,
///     transport::TcpConnector,
/// };
///
/// # async fn demo() -> osclink::Result<()> {
/// let endpoint = Endpoint::parse("http://192.168.1.1/")?;
/// let mut session = PreviewSession::new(
///     TcpConnector::default(),
///     endpoint,
///     PreviewConfig::default(),
/// );
/// while let Some(frame) = session.next_frame().await? {
///     println!("frame of {} bytes", frame.length());
/// }
/// # Ok(())
/// # }
/// ```
pub struct PreviewSession<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    config: PreviewConfig,
    authenticator: Option<Arc<DigestAuthenticator>>,
    cancel: CancellationToken,
    state: SessionState<C::Stream>,
}

impl<C: Connector> std::fmt::Debug for PreviewSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> PreviewSession<C> {
    /// Create an idle session. Nothing is sent until the first
    /// [`next_frame`](Self::next_frame).
    #[must_use]
    pub fn new(connector: C, endpoint: Endpoint, config: PreviewConfig) -> Self {
        Self {
            connector,
            endpoint,
            config: config.normalized(),
            authenticator: None,
            cancel: CancellationToken::new(),
            state: SessionState::Idle { reconnect: false },
        }
    }

    /// Answer digest challenges with `authenticator`. The authenticator may
    /// be shared with other clients of the same device.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<DigestAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Stop the session when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops this session from another task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase { self.state.phase() }

    /// Device endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Next frame, reconnecting as needed.
    ///
    /// Returns `Ok(None)` once the session is stopped, whether by
    /// [`stop`](Self::stop), cancellation, or an earlier error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PreviewUnavailable`] when every request attempt
    /// of a (re)connect failed, and permanent errors such as
    /// [`ClientError::Authentication`] or [`ClientError::PathNotFound`]
    /// immediately. The session is stopped afterwards.
    pub async fn next_frame(&mut self) -> Result<Option<FramePart>> {
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            result = self.advance() => result,
        };
        match result {
            Ok(Some(frame)) => {
                metrics::inc_preview_frames();
                Ok(Some(frame))
            }
            Ok(None) => {
                if cancel.is_cancelled() {
                    tracing::debug!(endpoint = %self.endpoint, "live preview cancelled");
                }
                self.stop().await;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint, error = %err, "live preview failed");
                metrics::inc_errors(Operation::Preview);
                self.stop().await;
                Err(err)
            }
        }
    }

    /// Deliver frames to `handler` until it returns `false` or the session
    /// stops. The handler receives each payload and its declared length.
    ///
    /// # Errors
    ///
    /// Propagates the error that stopped the session; see
    /// [`next_frame`](Self::next_frame).
    pub async fn run<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Bytes, usize) -> bool,
    {
        while let Some(frame) = self.next_frame().await? {
            let length = frame.length();
            if !handler(frame.into_payload(), length) {
                self.stop().await;
                break;
            }
        }
        Ok(())
    }

    /// Turn the session into a [`Stream`] of frames. The stream ends after
    /// the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<FramePart>> + Send {
        futures::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            match session.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(session))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Stop the session and close its connection. Idempotent; a stopped
    /// session never restarts.
    pub async fn stop(&mut self) {
        if let SessionState::Streaming(reader) = &mut self.state {
            reader.close().await;
        }
        if !matches!(self.state, SessionState::Stopped) {
            tracing::info!(endpoint = %self.endpoint, "live preview stopped");
        }
        self.state = SessionState::Stopped;
    }

    async fn advance(&mut self) -> Result<Option<FramePart>> {
        loop {
            match &mut self.state {
                SessionState::Stopped => return Ok(None),
                SessionState::Idle { reconnect } => {
                    if *reconnect {
                        tokio::time::sleep(self.config.retry_wait).await;
                        metrics::inc_preview_reconnects();
                        tracing::info!(endpoint = %self.endpoint, "reconnecting live preview");
                    }
                    self.state = SessionState::Requesting;
                }
                SessionState::Requesting => {
                    let reader = self.request_with_retries().await?;
                    tracing::info!(
                        endpoint = %self.endpoint,
                        boundary = reader.boundary().unwrap_or_default(),
                        "live preview stream opened"
                    );
                    self.state = SessionState::Streaming(reader);
                }
                SessionState::Streaming(reader) => match reader.next_part().await {
                    Ok(Some(frame)) => return Ok(Some(frame)),
                    Ok(None) => {
                        tracing::debug!("live preview stream ended");
                        reader.close().await;
                        self.state = SessionState::Idle { reconnect: true };
                    }
                    Err(err) if err.is_transient() => {
                        tracing::warn!(error = %err, "live preview stream interrupted");
                        reader.close().await;
                        self.state = SessionState::Idle { reconnect: true };
                    }
                    Err(err) => return Err(err),
                },
            }
        }
    }

    async fn request_with_retries(&self) -> Result<MultipartReader<C::Stream>> {
        let attempts = self.config.attempts;
        let mut attempt = 1;
        loop {
            match self.request().await {
                Ok(reader) => return Ok(reader),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= attempts => {
                    return Err(ClientError::PreviewUnavailable {
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts, error = %err, "live preview request failed");
                    tokio::time::sleep(self.config.retry_wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn request(&self) -> Result<MultipartReader<C::Stream>> {
        let target = self.endpoint.join(&self.config.path);
        let mut request = BodyRequest::post(
            &self.endpoint,
            &target,
            &self.config.content_type,
            self.config.body.as_bytes(),
        );
        let exchange = Exchange {
            connector: &self.connector,
            endpoint: &self.endpoint,
            authenticator: self.authenticator.as_deref(),
            read_buffer: self.config.read_buffer,
            method: "POST",
            path: &target,
        };
        let (conn, head) = exchange.send(&mut request).await?;
        Ok(MultipartReader::from_response(conn, &head))
    }
}
