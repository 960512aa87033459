//! One request/response exchange with the digest retry.
//!
//! Every request path (preview, commands, firmware upload) opens a fresh
//! connection, writes its request, and reads the response head. A 401 feeds
//! the shared [`DigestAuthenticator`] and the request is written once more on
//! a new connection with `Authorization` set.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    auth::DigestAuthenticator,
    endpoint::{Endpoint, normalize_path},
    error::{AuthFailure, ClientError, Result},
    http::{HttpConnection, RequestHead, ResponseHead, StatusClass},
    transport::{ClientStream, Connector},
};

/// Writes a request onto a fresh connection.
#[async_trait]
pub(crate) trait RequestWriter<S: ClientStream>: Send {
    /// Write the request head and body. `authorization` is the digest header
    /// value to send, if any.
    async fn write_request(
        &mut self,
        conn: &mut HttpConnection<S>,
        authorization: Option<String>,
    ) -> Result<()>;
}

/// Target and collaborators of an exchange.
pub(crate) struct Exchange<'a, C> {
    pub(crate) connector: &'a C,
    pub(crate) endpoint: &'a Endpoint,
    pub(crate) authenticator: Option<&'a DigestAuthenticator>,
    pub(crate) read_buffer: usize,
    pub(crate) method: &'static str,
    pub(crate) path: &'a str,
}

impl<C: Connector> Exchange<'_, C> {
    /// Run the exchange and return the connection positioned at the body of a
    /// 2xx response.
    ///
    /// A stored challenge is used up front; a 401 refreshes it and the
    /// request is retried once.
    pub(crate) async fn send<W>(
        &self,
        writer: &mut W,
    ) -> Result<(HttpConnection<C::Stream>, ResponseHead)>
    where
        W: RequestWriter<C::Stream>,
    {
        let uri = normalize_path(self.path);
        let preemptive = self
            .authenticator
            .filter(|auth| auth.challenge().is_some())
            .map(|auth| auth.header_for(&uri, self.method));
        let (mut conn, head) = self.attempt(writer, preemptive).await?;
        if head.class() != StatusClass::Unauthorized {
            return self.finish(conn, head).await;
        }
        conn.close().await;

        let auth = self.authenticator.ok_or(AuthFailure::NoCredentials)?;
        auth.on_unauthorized(head.header("www-authenticate"))?;
        tracing::debug!(path = %uri, "retrying with digest authorization");
        let (mut conn, head) = self
            .attempt(writer, Some(auth.header_for(&uri, self.method)))
            .await?;
        if head.class() == StatusClass::Unauthorized {
            conn.close().await;
            return Err(AuthFailure::Rejected.into());
        }
        self.finish(conn, head).await
    }

    async fn attempt<W>(
        &self,
        writer: &mut W,
        authorization: Option<String>,
    ) -> Result<(HttpConnection<C::Stream>, ResponseHead)>
    where
        W: RequestWriter<C::Stream>,
    {
        let channel = self
            .connector
            .connect(self.endpoint, self.read_buffer)
            .await?;
        let mut conn = HttpConnection::new(channel);
        let result = match writer.write_request(&mut conn, authorization).await {
            Ok(()) => conn.read_response_head().await,
            Err(err) => Err(err),
        };
        match result {
            Ok(head) => Ok((conn, head)),
            Err(err) => {
                conn.close().await;
                Err(err)
            }
        }
    }

    async fn finish(
        &self,
        mut conn: HttpConnection<C::Stream>,
        head: ResponseHead,
    ) -> Result<(HttpConnection<C::Stream>, ResponseHead)> {
        match head.class() {
            StatusClass::Success => Ok((conn, head)),
            StatusClass::NotFound => {
                conn.close().await;
                Err(ClientError::PathNotFound {
                    path: normalize_path(self.path),
                })
            }
            StatusClass::Unauthorized | StatusClass::Other => {
                Err(status_error(&mut conn, head).await)
            }
        }
    }
}

/// Build [`ClientError::Status`] from a failed response, reading its body
/// when the head frames one. The connection is closed.
pub(crate) async fn status_error<S: ClientStream>(
    conn: &mut HttpConnection<S>,
    head: ResponseHead,
) -> ClientError {
    let body = if head.is_chunked() || head.content_length().is_some() {
        match conn.read_body().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring unreadable error body");
                Bytes::new()
            }
        }
    } else {
        Bytes::new()
    };
    conn.close().await;
    ClientError::Status {
        status: head.status(),
        reason: head.reason().to_owned(),
        headers: head.headers().clone(),
        body,
    }
}

/// A request with an in-memory body.
pub(crate) struct BodyRequest<'a> {
    pub(crate) head: RequestHead,
    pub(crate) body: &'a [u8],
}

impl<'a> BodyRequest<'a> {
    /// `POST` of `body` to `path` with `Connection: close`.
    pub(crate) fn post(
        endpoint: &Endpoint,
        path: &str,
        content_type: &str,
        body: &'a [u8],
    ) -> Self {
        let head = RequestHead::new("POST", path)
            .header("Host", endpoint.host_header())
            .header("Accept", "*/*")
            .header("Connection", "close")
            .header("Content-Type", content_type)
            .header("Content-Length", body.len().to_string());
        Self { head, body }
    }
}

#[async_trait]
impl<S: ClientStream> RequestWriter<S> for BodyRequest<'_> {
    async fn write_request(
        &mut self,
        conn: &mut HttpConnection<S>,
        authorization: Option<String>,
    ) -> Result<()> {
        let head = self.head.clone().header_opt("Authorization", authorization);
        conn.send_head(&head).await?;
        conn.write_all(self.body).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        auth::{DigestChallenge, DigestCredential},
        transport::ByteChannel,
    };

    /// Answers each connection with the next scripted response after
    /// reading the request head and recording it.
    struct Scripted {
        replies: Mutex<VecDeque<&'static str>>,
        heads: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(replies: &[&'static str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().copied().collect()),
                heads: Arc::default(),
            }
        }

        fn heads(&self) -> Vec<String> { self.heads.lock().expect("heads lock").clone() }
    }

    #[async_trait]
    impl Connector for Scripted {
        type Stream = DuplexStream;

        async fn connect(
            &self,
            _endpoint: &Endpoint,
            read_buffer: usize,
        ) -> Result<ByteChannel<DuplexStream>> {
            let reply = self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .expect("more connections than scripted");
            let heads = Arc::clone(&self.heads);
            let (client, mut server) = duplex(4096);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut buf = [0u8; 512];
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match server.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(count) => seen.extend_from_slice(&buf[..count]),
                    }
                }
                heads
                    .lock()
                    .expect("heads lock")
                    .push(String::from_utf8_lossy(&seen).into_owned());
                server.write_all(reply.as_bytes()).await.expect("write reply");
            });
            Ok(ByteChannel::with_capacity(client, None, read_buffer))
        }
    }

    const CHALLENGE: &str = "HTTP/1.1 401 Unauthorized\r\n\
        WWW-Authenticate: Digest realm=\"cam\", nonce=\"n0\", qop=\"auth\"\r\n\
        Content-Length: 0\r\n\r\n";
    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

    fn endpoint() -> Endpoint { Endpoint::parse("http://cam/").expect("valid endpoint") }

    async fn post(
        connector: &Scripted,
        authenticator: Option<&DigestAuthenticator>,
    ) -> Result<Bytes> {
        let endpoint = endpoint();
        let mut request = BodyRequest::post(&endpoint, "/osc/state", "application/json", b"{}");
        let exchange = Exchange {
            connector,
            endpoint: &endpoint,
            authenticator,
            read_buffer: 256,
            method: "POST",
            path: "/osc/state",
        };
        let (mut conn, _) = exchange.send(&mut request).await?;
        let body = conn.read_body().await;
        conn.close().await;
        body
    }

    #[traced_test]
    #[tokio::test]
    async fn retries_once_with_digest_authorization() {
        let connector = Scripted::new(&[CHALLENGE, OK]);
        let auth = DigestAuthenticator::new(DigestCredential::new("u", Some("p".to_owned())));
        let body = post(&connector, Some(&auth)).await.expect("exchange");
        assert_eq!(&body[..], b"ok");

        let heads = connector.heads();
        assert_eq!(heads.len(), 2);
        assert!(!heads[0].contains("Authorization"));
        assert!(heads[1].contains("Authorization: Digest username=\"u\", realm=\"cam\""));
        assert!(logs_contain("retrying with digest authorization"));
    }

    #[tokio::test]
    async fn stored_challenge_is_sent_up_front() {
        let connector = Scripted::new(&[OK]);
        let auth = DigestAuthenticator::new(DigestCredential::new("u", Some("p".to_owned())));
        auth.set_challenge(DigestChallenge::new("cam", "n1"));
        post(&connector, Some(&auth)).await.expect("exchange");
        let heads = connector.heads();
        assert_eq!(heads.len(), 1);
        assert!(heads[0].contains("nonce=\"n1\""));
    }

    #[rstest]
    #[case::not_found("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n", 404)]
    #[case::server_error("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\noops", 500)]
    #[tokio::test]
    async fn failed_statuses_are_errors(#[case] reply: &'static str, #[case] status: u16) {
        let connector = Scripted::new(&[reply]);
        let err = post(&connector, None).await.expect_err("status error");
        match err {
            ClientError::PathNotFound { path } => {
                assert_eq!(status, 404);
                assert_eq!(path, "/osc/state");
            }
            ClientError::Status { status: got, body, .. } => {
                assert_eq!(got, status);
                assert_eq!(&body[..], b"oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn challenge_without_credentials_is_fatal() {
        let connector = Scripted::new(&[CHALLENGE]);
        let err = post(&connector, None).await.expect_err("no credentials");
        assert!(
            matches!(err, ClientError::Authentication(AuthFailure::NoCredentials)),
            "got {err:?}"
        );
    }
}
