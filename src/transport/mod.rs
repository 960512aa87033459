//! Buffered TCP transport.
//!
//! A [`Connector`] opens one [`ByteChannel`] per request. Sessions are generic
//! over the connector so they can be driven over in-memory streams as well as
//! real sockets.

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{
    config::Timeouts,
    endpoint::{Endpoint, Scheme},
    error::{ClientError, Result},
};

mod channel;

pub use channel::{ByteChannel, DEFAULT_READ_BUFFER};

/// Byte streams a [`ByteChannel`] can wrap.
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

/// Opens channels to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stream type carried by the opened channels.
    type Stream: ClientStream + 'static;

    /// Open a fresh channel whose read buffer holds `read_buffer` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] when the endpoint cannot be reached.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        read_buffer: usize,
    ) -> Result<ByteChannel<Self::Stream>>;
}

/// Connects over plain TCP with `TCP_NODELAY` set.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector {
    timeouts: Timeouts,
}

impl TcpConnector {
    /// Create a connector using `timeouts` for connecting and idle reads.
    #[must_use]
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts: timeouts.normalized(),
        }
    }

    /// Configured timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts { self.timeouts }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        read_buffer: usize,
    ) -> Result<ByteChannel<TcpStream>> {
        if endpoint.scheme() == Scheme::Https {
            return Err(ClientError::UnsupportedScheme(
                endpoint.scheme().as_str().to_owned(),
            ));
        }
        let (host, port) = (endpoint.host(), endpoint.port());
        let address = (endpoint.resolve_host(), port);
        let stream = tokio::time::timeout(self.timeouts.connect, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ClientError::connect(host, port, io::Error::from(io::ErrorKind::TimedOut))
            })?
            .map_err(|source| ClientError::connect(host, port, source))?;
        if let Err(error) = stream.set_nodelay(true) {
            log::warn!("failed to set TCP_NODELAY for {host}:{port}: {error}");
        }
        log::debug!("connected to {host}:{port}");
        Ok(ByteChannel::with_capacity(
            stream,
            Some(self.timeouts.idle),
            read_buffer,
        ))
    }
}

#[cfg(test)]
mod tests;
