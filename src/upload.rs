//! Firmware upload.
//!
//! The firmware image is posted as a `multipart/form-data` body streamed from
//! disk. Devices reboot into the flasher once the body is in, and some of
//! them drop the connection without a status line or send a truncated
//! response; both count as success once the full body was written.

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    auth::DigestAuthenticator,
    command::{CommandResponse, device_error},
    config::Timeouts,
    endpoint::Endpoint,
    error::{ClientError, Result},
    exchange::{Exchange, RequestWriter},
    http::{HttpConnection, RequestHead},
    metrics::{self, Operation},
    multipart::{MultipartEncoder, ProgressTracker, UPLOAD_BOUNDARY, UploadPart},
    transport::{ClientStream, Connector, DEFAULT_READ_BUFFER, TcpConnector},
};

/// Uploads firmware images to a device.
#[derive(Debug)]
pub struct FirmwareUploader<C = TcpConnector> {
    connector: C,
    endpoint: Endpoint,
    authenticator: Option<Arc<DigestAuthenticator>>,
    boundary: String,
}

impl FirmwareUploader<TcpConnector> {
    /// Uploader over TCP with [`Timeouts::upload`].
    #[must_use]
    pub fn tcp(endpoint: Endpoint) -> Self {
        Self::new(TcpConnector::new(Timeouts::upload()), endpoint)
    }
}

impl<C: Connector> FirmwareUploader<C> {
    /// Uploader using `connector`.
    #[must_use]
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            authenticator: None,
            boundary: UPLOAD_BOUNDARY.to_owned(),
        }
    }

    /// Answer digest challenges with `authenticator`.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<DigestAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Use `boundary` instead of [`UPLOAD_BOUNDARY`].
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Post `files` to `api_path`, reporting the percentage of file bytes
    /// sent to `progress`.
    ///
    /// A device that answers with an empty body, or closes the connection
    /// after the whole body was sent, yields
    /// `{"name":"camera.<api_path>","state":"done"}`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoUploadFiles`] for an empty file list,
    /// [`ClientError::UploadFile`] when a file cannot be read,
    /// [`ClientError::DeviceApi`] when the device reports an error, and
    /// transport, status and authentication errors.
    pub async fn update_firmware(
        &self,
        api_path: &str,
        files: &[PathBuf],
        progress: Option<&mut (dyn FnMut(u8) + Send)>,
    ) -> Result<CommandResponse> {
        let result = self.upload(api_path, files, progress).await;
        if let Err(err) = &result {
            tracing::warn!(endpoint = %self.endpoint, error = %err, "firmware upload failed");
            metrics::inc_errors(Operation::Upload);
        }
        result
    }

    async fn upload(
        &self,
        api_path: &str,
        files: &[PathBuf],
        progress: Option<&mut (dyn FnMut(u8) + Send)>,
    ) -> Result<CommandResponse> {
        if files.is_empty() {
            return Err(ClientError::NoUploadFiles);
        }
        let mut parts = Vec::with_capacity(files.len());
        for file in files {
            parts.push(UploadPart::from_path(file).await?);
        }
        let encoder = MultipartEncoder::new(self.boundary.clone(), parts)?;
        let target = self.endpoint.join(api_path);
        let mut tracker = ProgressTracker::new(encoder.file_bytes(), progress);
        tracing::info!(
            endpoint = %self.endpoint,
            path = %target,
            files = files.len(),
            content_length = encoder.content_length(),
            "uploading firmware"
        );

        let mut request = UploadRequest {
            endpoint: &self.endpoint,
            target: &target,
            encoder: &encoder,
            progress: &mut tracker,
            sent: false,
        };
        let exchange = Exchange {
            connector: &self.connector,
            endpoint: &self.endpoint,
            authenticator: self.authenticator.as_deref(),
            read_buffer: DEFAULT_READ_BUFFER,
            method: "POST",
            path: &target,
        };
        let body = match exchange.send(&mut request).await {
            Ok((mut conn, _head)) => read_upload_response(&mut conn).await?,
            Err(err) if request.sent && is_silent_close(&err) => {
                tracing::info!(error = %err, "device closed the connection after the upload");
                Bytes::new()
            }
            Err(err) => return Err(device_error(err)),
        };

        if body.iter().all(u8::is_ascii_whitespace) {
            let name = format!("camera.{}", api_path.trim_start_matches('/'));
            return Ok(CommandResponse::done(name));
        }
        let response: CommandResponse = serde_json::from_slice(&body)?;
        response.into_result()
    }
}

/// Read the response body; a body cut short by the device counts as empty.
async fn read_upload_response<S: ClientStream>(conn: &mut HttpConnection<S>) -> Result<Bytes> {
    let body = conn.read_body().await;
    conn.close().await;
    match body {
        Ok(body) => Ok(body),
        Err(err) if is_silent_close(&err) || matches!(err, ClientError::ShortBody { .. }) => {
            tracing::debug!(error = %err, "ignoring truncated upload response");
            Ok(Bytes::new())
        }
        Err(err) => Err(err),
    }
}

fn is_silent_close(err: &ClientError) -> bool {
    match err {
        ClientError::Disconnected => true,
        ClientError::Io(source) => matches!(
            source.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

struct UploadRequest<'a, 'p> {
    endpoint: &'a Endpoint,
    target: &'a str,
    encoder: &'a MultipartEncoder,
    progress: &'a mut ProgressTracker<'p>,
    sent: bool,
}

#[async_trait]
impl<S: ClientStream> RequestWriter<S> for UploadRequest<'_, '_> {
    async fn write_request(
        &mut self,
        conn: &mut HttpConnection<S>,
        authorization: Option<String>,
    ) -> Result<()> {
        self.sent = false;
        self.progress.restart();
        let head = RequestHead::new("POST", self.target)
            .header("Host", self.endpoint.host_header())
            .header("Accept", "*/*")
            .header("Content-Length", self.encoder.content_length().to_string())
            .header("Connection", "Keep-Alive")
            .header("Cache-Control", "no-cache")
            .header("Content-Type", self.encoder.content_type())
            .header_opt("Authorization", authorization);
        conn.send_head(&head).await?;
        let written = self.encoder.write_body(conn, self.progress).await?;
        tracing::debug!(written, "firmware body sent");
        self.sent = true;
        Ok(())
    }
}
