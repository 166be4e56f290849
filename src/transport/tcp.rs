//! TCP transport.
//!
//! # Example
//!
//! ```ignore
//! use routewire_client::transport::{Connector, TcpConnector};
//! use routewire_client::ConnectParams;
//!
//! let stream = TcpConnector.connect(&ConnectParams::new("127.0.0.1", 3010)).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConnectParams;
use crate::error::Result;
use crate::handler::BoxFuture;

/// Byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport.
pub type BoxedTransport = Box<dyn Transport>;

/// Opens transports for [`Client::init`](crate::Client::init).
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, params: &'a ConnectParams) -> BoxFuture<'a, Result<BoxedTransport>>;
}

/// Plain TCP with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, params: &'a ConnectParams) -> BoxFuture<'a, Result<BoxedTransport>> {
        Box::pin(async move {
            let stream = TcpStream::connect((params.host.as_str(), params.port)).await?;
            stream.set_nodelay(true)?;
            debug!(host = %params.host, port = params.port, "TCP connected");
            Ok(Box::new(stream) as BoxedTransport)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = TcpConnector
            .connect(&ConnectParams::new("127.0.0.1", port))
            .await
            .unwrap();
        stream.write_all(&[3, 0, 0, 0]).await.unwrap();

        assert_eq!(server.await.unwrap(), [3, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector
            .connect(&ConnectParams::new("127.0.0.1", port))
            .await;
        assert!(result.is_err());
    }
}
