//! Error types for routewire-client.

use thiserror::Error;

/// Main error type for all routewire operations.
#[derive(Debug, Error)]
pub enum RoutewireError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (handshake and fallback payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Handshake did not complete.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Protocol error (malformed packet or message envelope).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No session, or the session has not finished its handshake.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived within the configured request timeout.
    #[error("Request timed out")]
    RequestTimeout,

    /// Outbound packet queue is full.
    #[error("Outbound queue full")]
    Backpressure,
}

/// Errors raised synchronously by the schema encoder and decoder.
///
/// None of these are retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// Truncated buffer, unterminated varint, bad length or bad UTF-8.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A tag with no field in the active message schema.
    #[error("unknown field tag {0}")]
    UnknownField(u32),

    /// A message type name that no schema scope defines.
    #[error("unknown message type `{0}`")]
    UnknownMessageType(String),

    /// A required field is absent from the value being encoded.
    #[error("missing required field `{0}`")]
    MissingRequiredField(String),

    /// A field value does not match its declared wire type.
    #[error("field `{field}` expects {expected}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Human readable description of the accepted values.
        expected: &'static str,
    },

    /// Schema data from the handshake could not be parsed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Reasons a handshake fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Peer answered 501: this client's protocol is too old.
    #[error("client version is too old")]
    OldClient,

    /// Peer answered with a non-success status.
    #[error("handshake rejected with status {0}")]
    Rejected(u16),

    /// No handshake response within the configured window.
    #[error("handshake timed out")]
    Timeout,

    /// Handshake response could not be understood.
    #[error("invalid handshake response: {0}")]
    InvalidResponse(String),
}

/// Result type alias using RoutewireError.
pub type Result<T> = std::result::Result<T, RoutewireError>;
