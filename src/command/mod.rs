//! JSON command execution and status queries.
//!
//! Commands are posted to `/osc/commands/execute`; long-running ones answer
//! `inProgress` with an id that is then polled through
//! `/osc/commands/status` by a [`CommandPoller`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    auth::DigestAuthenticator,
    config::{COMMAND_EXECUTE_PATH, COMMAND_STATUS_PATH},
    endpoint::Endpoint,
    error::{ClientError, Result},
    exchange::{BodyRequest, Exchange},
    metrics::{self, Operation},
    transport::{Connector, DEFAULT_READ_BUFFER},
};

mod poller;

pub use poller::{CommandPoller, DEFAULT_POLL_INTERVAL, StatusSource};

/// `Content-Type` of command bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Execution state reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandState {
    /// Finished; `results` may be present.
    Done,
    /// Still running; poll by id.
    InProgress,
    /// Failed; `error` describes why.
    Error,
}

/// Error object of a failed command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceError {
    /// Device error code, e.g. `invalidParameterValue`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Completion of a running command.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandProgress {
    /// Completion rate, `0.0..=1.0` on most models.
    pub completion: f32,
}

/// Response to a command or status request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Executed command, e.g. `camera.convertVideoFormats`.
    #[serde(default)]
    pub name: String,
    /// Execution state.
    pub state: CommandState,
    /// Command id, present while the command is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Command-specific results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    /// Error details when `state` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeviceError>,
    /// Progress while `state` is `inProgress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<CommandProgress>,
}

impl CommandResponse {
    /// A finished response for `name` without results.
    #[must_use]
    pub fn done(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: CommandState::Done,
            id: None,
            results: None,
            error: None,
            progress: None,
        }
    }

    /// Turn an `error` state into [`ClientError::DeviceApi`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DeviceApi`] when `state` is
    /// [`CommandState::Error`].
    ///
    /// # Examples
    ///
    /// ```
    /// use osclink::{ClientError, command::CommandResponse};
    ///
    /// let failed: CommandResponse = serde_json::from_str(
    ///     r#"{"name":"camera.takePicture","state":"error",
    ///         "error":{"code":"disabledCommand","message":"busy"}}"#,
    /// )
    /// .expect("valid response");
    /// let err = failed.into_result().expect_err("device reported an error");
    /// assert!(matches!(err, ClientError::DeviceApi { code, .. } if code == "disabledCommand"));
    /// ```
    pub fn into_result(self) -> Result<Self> {
        if self.state != CommandState::Error {
            return Ok(self);
        }
        let error = self.error.unwrap_or_else(|| DeviceError {
            code: "unknownError".to_owned(),
            message: format!("{} failed without error details", self.name),
        });
        Err(ClientError::DeviceApi {
            code: error.code,
            message: error.message,
        })
    }
}

/// Map a non-2xx status whose body is a device error object to
/// [`ClientError::DeviceApi`]; other errors pass through.
pub(crate) fn device_error(err: ClientError) -> ClientError {
    let ClientError::Status { body, .. } = &err else {
        return err;
    };
    match serde_json::from_slice::<CommandResponse>(body) {
        Ok(CommandResponse {
            error: Some(error), ..
        }) => ClientError::DeviceApi {
            code: error.code,
            message: error.message,
        },
        _ => err,
    }
}

/// Executes commands and queries their status.
///
/// Every request opens a fresh connection with `Connection: close`.
#[derive(Debug)]
pub struct CommandClient<C> {
    connector: C,
    endpoint: Endpoint,
    authenticator: Option<Arc<DigestAuthenticator>>,
}

impl<C: Connector> CommandClient<C> {
    /// Client for the device at `endpoint`.
    #[must_use]
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            authenticator: None,
        }
    }

    /// Answer digest challenges with `authenticator`.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<DigestAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Device endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Execute command `name` with `parameters`.
    ///
    /// A response in the `error` state is returned as is; call
    /// [`CommandResponse::into_result`] to turn it into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DeviceApi`] when the device rejects the command
    /// with an error body, [`ClientError::Json`] when the response is not a
    /// command response, and transport, status and authentication errors.
    pub async fn execute(&self, name: &str, parameters: Value) -> Result<CommandResponse> {
        self.post(COMMAND_EXECUTE_PATH, &json!({ "name": name, "parameters": parameters }))
            .await
    }

    /// Query the state of the command with `id`.
    ///
    /// # Errors
    ///
    /// As for [`execute`](Self::execute).
    pub async fn status(&self, id: &str) -> Result<CommandResponse> {
        self.post(COMMAND_STATUS_PATH, &json!({ "id": id })).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<CommandResponse> {
        let result = self.exchange(path, body).await;
        if result.is_err() {
            metrics::inc_errors(Operation::Command);
        }
        result
    }

    async fn exchange(&self, path: &str, body: &Value) -> Result<CommandResponse> {
        let payload = serde_json::to_vec(body)?;
        let target = self.endpoint.join(path);
        let mut request = BodyRequest::post(&self.endpoint, &target, JSON_CONTENT_TYPE, &payload);
        let exchange = Exchange {
            connector: &self.connector,
            endpoint: &self.endpoint,
            authenticator: self.authenticator.as_deref(),
            read_buffer: DEFAULT_READ_BUFFER,
            method: "POST",
            path: &target,
        };
        let (mut conn, head) = exchange.send(&mut request).await.map_err(device_error)?;
        let response = conn.read_body().await;
        conn.close().await;
        let response = response?;
        tracing::debug!(path = %target, status = head.status(), len = response.len(), "command answered");
        Ok(serde_json::from_slice(&response)?)
    }
}

#[async_trait]
impl<C: Connector> StatusSource for CommandClient<C> {
    async fn fetch_status(&self, id: &str) -> Result<CommandResponse> { self.status(id).await }
}

#[cfg(test)]
mod tests;
