//! Scripted camera behind a [`Connector`].
//!
//! Every `connect` consumes the next [`Reply`] of the script and spawns a
//! task that plays the device side of an in-memory duplex stream: it reads
//! one request (head and `Content-Length` body), records it, then answers
//! as scripted.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use osclink::{ByteChannel, ClientError, Connector, Endpoint, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    sync::Notify,
};

/// Buffer size of each simulated connection.
pub const DUPLEX_CAPACITY: usize = 64 * 1024;

/// How the device answers one connection.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Refuse the connection.
    Refuse,
    /// Read the request, write these bytes and close.
    Respond(Vec<u8>),
    /// Read the request, write these bytes and keep the connection open
    /// until the client closes it.
    Hold(Vec<u8>),
    /// Read the request and close without answering.
    Close,
}

/// A request as received by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request line without CRLF.
    pub request_line: String,
    /// Header fields in arrival order.
    pub headers: Vec<(String, String)>,
    /// Body bytes, as many as `Content-Length` announced.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Request method.
    #[must_use]
    pub fn method(&self) -> &str { self.request_line.split(' ').next().unwrap_or_default() }

    /// Request target.
    #[must_use]
    pub fn path(&self) -> &str { self.request_line.split(' ').nth(1).unwrap_or_default() }

    /// First header named `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

#[derive(Default)]
struct Shared {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    connects: AtomicUsize,
    finished: AtomicUsize,
    finished_notify: Notify,
}

/// Scripted device usable as a [`Connector`]. Clones share the script and
/// the recorded traffic. Once the script is exhausted every connection is
/// refused.
#[derive(Clone, Default)]
pub struct MockDevice {
    shared: Arc<Shared>,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("connects", &self.connects())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl MockDevice {
    /// Device answering connections with `replies` in order.
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let device = Self::default();
        device.push(replies);
        device
    }

    /// Apply `timeout` as the idle-read timeout of client channels.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Endpoint to pair with this device.
    ///
    /// # Panics
    ///
    /// Never; the URL is a constant.
    #[must_use]
    pub fn endpoint() -> Endpoint {
        Endpoint::parse("http://camera.local/").expect("constant endpoint is valid")
    }

    /// Append `replies` to the script.
    pub fn push(&self, replies: impl IntoIterator<Item = Reply>) {
        self.shared
            .replies
            .lock()
            .expect("replies lock")
            .extend(replies);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().expect("requests lock").clone()
    }

    /// Connection attempts so far, refused ones included.
    #[must_use]
    pub fn connects(&self) -> usize { self.shared.connects.load(Ordering::SeqCst) }

    /// Connections whose device side has finished.
    #[must_use]
    pub fn finished(&self) -> usize { self.shared.finished.load(Ordering::SeqCst) }

    /// Wait until at least `count` connections have finished on the device
    /// side. A held connection finishes once the client closes it.
    pub async fn wait_finished(&self, count: usize) {
        loop {
            let notified = self.shared.finished_notify.notified();
            if self.finished() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Connector for MockDevice {
    type Stream = DuplexStream;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        read_buffer: usize,
    ) -> Result<ByteChannel<DuplexStream>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .shared
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Reply::Refuse);
        if matches!(reply, Reply::Refuse) {
            return Err(ClientError::Connect {
                host: endpoint.host().to_owned(),
                port: endpoint.port(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        let (client, server) = duplex(DUPLEX_CAPACITY);
        tokio::spawn(serve(Arc::clone(&self.shared), server, reply));
        Ok(ByteChannel::with_capacity(
            client,
            self.idle_timeout,
            read_buffer,
        ))
    }
}

async fn serve(shared: Arc<Shared>, mut stream: DuplexStream, reply: Reply) {
    if let Ok(Some(request)) = read_request(&mut stream).await {
        shared
            .requests
            .lock()
            .expect("requests lock")
            .push(request);
        match reply {
            Reply::Respond(bytes) => {
                let _ = stream.write_all(&bytes).await;
                let _ = stream.shutdown().await;
            }
            Reply::Hold(bytes) => {
                if stream.write_all(&bytes).await.is_ok() {
                    let mut sink = [0u8; 1024];
                    while matches!(stream.read(&mut sink).await, Ok(count) if count > 0) {}
                }
            }
            Reply::Close | Reply::Refuse => {}
        }
    }
    drop(stream);
    shared.finished.fetch_add(1, Ordering::SeqCst);
    shared.finished_notify.notify_waiters();
}

async fn read_request(stream: &mut DuplexStream) -> io::Result<Option<RecordedRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let count = stream.read(&mut chunk).await?;
        if count == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..count]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_owned();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
        .collect();
    let length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf.split_off(head_end + 4);
    while body.len() < length {
        let count = stream.read(&mut chunk).await?;
        if count == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..count]);
    }
    body.truncate(length);
    Ok(Some(RecordedRequest {
        request_line,
        headers,
        body,
    }))
}
