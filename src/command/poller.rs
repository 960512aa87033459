//! Poll-until-terminal loop for asynchronous commands.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{CommandResponse, CommandState};
use crate::{
    error::{ClientError, ProtocolError, Result},
    metrics::{self, Operation},
};

/// Pause between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Source of command status updates.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current state of the command with `id`.
    ///
    /// # Errors
    ///
    /// Returns any failure of the underlying status request.
    async fn fetch_status(&self, id: &str) -> Result<CommandResponse>;
}

/// Polls an in-progress command until it is `done` or `error`.
///
/// There is no cap on the number of polls; cancel the poller's token to
/// give up.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use osclink::command::{CommandPoller, DEFAULT_POLL_INTERVAL};
///
/// let poller = CommandPoller::default();
/// assert_eq!(poller.interval(), DEFAULT_POLL_INTERVAL);
/// assert_eq!(CommandPoller::new(Duration::ZERO).interval(), Duration::from_millis(1));
/// ```
#[derive(Clone, Debug)]
pub struct CommandPoller {
    interval: Duration,
    cancel: CancellationToken,
}

impl Default for CommandPoller {
    fn default() -> Self { Self::new(DEFAULT_POLL_INTERVAL) }
}

impl CommandPoller {
    /// Poll every `interval`, clamped to at least one millisecond.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            cancel: CancellationToken::new(),
        }
    }

    /// End polling with [`ClientError::Cancelled`] when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Poll interval.
    #[must_use]
    pub const fn interval(&self) -> Duration { self.interval }

    /// Token that cancels this poller.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Poll `initial` to completion.
    ///
    /// # Errors
    ///
    /// See [`poll_with_progress`](Self::poll_with_progress).
    pub async fn poll<S>(&self, source: &S, initial: CommandResponse) -> Result<CommandResponse>
    where
        S: StatusSource + ?Sized,
    {
        self.poll_with_progress(source, initial, |_| {}).await
    }

    /// Poll `initial` to completion, passing the device's completion value of
    /// every in-progress response to `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DeviceApi`] when the command ends in `error`,
    /// [`ProtocolError::MissingCommandId`] when an in-progress response has
    /// no id, [`ClientError::Cancelled`] on cancellation, and any error of
    /// the status source.
    pub async fn poll_with_progress<S, F>(
        &self,
        source: &S,
        initial: CommandResponse,
        progress: F,
    ) -> Result<CommandResponse>
    where
        S: StatusSource + ?Sized,
        F: FnMut(f32) + Send,
    {
        let result = self.run(source, initial, progress).await;
        if result.is_err() {
            metrics::inc_errors(Operation::Command);
        }
        result
    }

    async fn run<S, F>(
        &self,
        source: &S,
        mut response: CommandResponse,
        mut progress: F,
    ) -> Result<CommandResponse>
    where
        S: StatusSource + ?Sized,
        F: FnMut(f32) + Send,
    {
        let mut id: Option<String> = None;
        loop {
            if response.state != CommandState::InProgress {
                return response.into_result();
            }
            id = response.id.take().or(id);
            let Some(current) = id.as_deref() else {
                return Err(ProtocolError::MissingCommandId.into());
            };
            if let Some(report) = response.progress {
                progress(report.completion);
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                () = tokio::time::sleep(self.interval) => {}
            }
            tracing::debug!(id = current, "polling command status");
            response = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                status = source.fetch_status(current) => status?,
            };
        }
    }
}
