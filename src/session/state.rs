//! Session lifecycle states.

/// Lifecycle of one connection.
///
/// `Disconnected -> Connecting -> AwaitingHandshakeAck -> Connected -> Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Handshake sent, waiting for the peer's answer.
    AwaitingHandshakeAck,
    Connected,
}

impl SessionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}
