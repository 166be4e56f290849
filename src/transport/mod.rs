//! Transport module - opening the byte stream a session runs over.
//!
//! Sessions accept any `AsyncRead + AsyncWrite` stream; [`Connector`] is the
//! seam `Client::init` uses to open one. [`TcpConnector`] is the default.

mod tcp;

pub use tcp::{BoxedTransport, Connector, TcpConnector, Transport};
