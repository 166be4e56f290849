//! Client configuration.
//!
//! Usually set through [`ClientBuilder`](crate::ClientBuilder); every field
//! has a default suitable for a game or live-service client.

use std::time::Duration;

use serde_json::Value;

use crate::protocol::MAX_BODY_SIZE;
use crate::writer::WriterConfig;

/// Default time allowed for the handshake to complete.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default slack added to the heartbeat timeout window.
pub const DEFAULT_HEARTBEAT_GRACE: Duration = Duration::from_millis(500);

/// Default maximum concurrent push handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Default capacity of the command channel into a session.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Default time a local disconnect waits for queued packets to flush.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default transport read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// What to do when the peer answers the handshake with a status other than
/// 200 (success) or 501 (client too old, always fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeFailurePolicy {
    /// Emit an error event, then acknowledge and connect anyway.
    #[default]
    Acknowledge,
    /// Emit an error event and stay un-connected; `init` fails.
    Reject,
}

/// Everything tunable on a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `sys.type` in the handshake request.
    pub client_type: Option<String>,
    /// `sys.version` in the handshake request.
    pub client_version: Option<String>,
    /// Schema version announced in the handshake.
    pub proto_version: u64,
    /// `user` object in the handshake request (auth data and the like).
    pub user: Value,
    pub handshake_timeout: Duration,
    pub handshake_failure_policy: HandshakeFailurePolicy,
    pub heartbeat_grace: Duration,
    /// Per-request reply deadline; `None` waits until disconnect.
    pub request_timeout: Option<Duration>,
    /// How long a local disconnect lets the writer flush before aborting it.
    /// Any other disconnect aborts the writer at once.
    pub close_timeout: Duration,
    pub writer: WriterConfig,
    /// Largest inbound packet body accepted.
    pub max_body_size: usize,
    pub read_buffer_size: usize,
    pub command_capacity: usize,
    pub max_concurrent_handlers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_type: None,
            client_version: None,
            proto_version: 0,
            user: Value::Object(Default::default()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handshake_failure_policy: HandshakeFailurePolicy::default(),
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
            request_timeout: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            writer: WriterConfig::default(),
            max_body_size: MAX_BODY_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    /// Not implemented: logged and ignored.
    pub encrypt: bool,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            encrypt: false,
        }
    }

    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_grace, Duration::from_millis(500));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.close_timeout, Duration::from_secs(1));
        assert_eq!(config.handshake_failure_policy, HandshakeFailurePolicy::Acknowledge);
        assert_eq!(config.proto_version, 0);
        assert!(config.user.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_connect_params() {
        let params = ConnectParams::new("127.0.0.1", 3010).encrypt(true);
        assert_eq!(params.host, "127.0.0.1");
        assert_eq!(params.port, 3010);
        assert!(params.encrypt);
    }
}
