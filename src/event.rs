//! Events delivered to the application.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RoutewireError;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect`, re-`init`, handshake timeout or the client was dropped.
    Local,
    /// Peer closed the transport.
    PeerClosed,
    /// Transport read failed.
    TransportError,
    /// No peer heartbeat within the timeout window.
    HeartbeatTimeout,
    /// Inbound bytes could not be framed.
    Protocol,
}

/// Asynchronous notifications from the session.
#[derive(Debug)]
pub enum ClientEvent {
    /// Handshake failure, undecodable push or failed push handler, malformed
    /// envelope.
    Error(RoutewireError),
    /// A send or read on the transport failed.
    IoError(String),
    /// Emitted right before the session is torn down for a missed heartbeat.
    HeartbeatTimeout,
    /// Transport closed. Always followed by `Disconnect`.
    Close,
    Disconnect(DisconnectReason),
    /// Peer kicked this client.
    Kick(Value),
    /// Push on a route with no registered handler.
    Push { route: String, body: Value },
}

/// Receiving half of the event stream returned by
/// [`ClientBuilder::build`](crate::ClientBuilder::build).
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

pub(crate) type EventSender = mpsc::UnboundedSender<ClientEvent>;
