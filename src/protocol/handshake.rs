//! Handshake bodies.
//!
//! The client opens with a HANDSHAKE packet carrying its capabilities and the
//! user payload; the peer answers with a HANDSHAKE packet carrying a status
//! code and the negotiated session parameters.
//!
//! # Example
//!
//! ```
//! use routewire_client::protocol::HandshakeResponse;
//!
//! let body = br#"{"code":200,"sys":{"heartbeat":5,"dict":{"foo.bar":1}}}"#;
//! let response = HandshakeResponse::parse(body).unwrap();
//! assert!(response.check().is_ok());
//! assert_eq!(response.sys.dict.unwrap()["foo.bar"], 1);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HandshakeError, Result};

/// Handshake accepted.
pub const CODE_OK: u16 = 200;

/// Handshake refused because the client protocol is too old.
pub const CODE_OLD_CLIENT: u16 = 501;

/// Client side of the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    pub sys: ClientInfo,
    pub user: Value,
}

/// Capabilities announced by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub client_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Schema version the client already holds.
    pub proto_version: u64,
}

impl HandshakeRequest {
    pub fn to_body(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Peer side of the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeResponse {
    pub code: u16,
    #[serde(default)]
    pub sys: SessionInfo,
}

/// Negotiated session parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    /// Heartbeat interval in seconds; absent or 0 disables heartbeats.
    #[serde(default)]
    pub heartbeat: Option<u64>,
    /// Route name to dictionary code.
    #[serde(default)]
    pub dict: Option<HashMap<String, u16>>,
    #[serde(default)]
    pub protos: Option<Protos>,
}

/// Schema maps for both directions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protos {
    #[serde(default)]
    pub proto_version: u64,
    /// Decode side (peer to client).
    #[serde(default)]
    pub server: Value,
    /// Encode side (client to peer).
    #[serde(default)]
    pub client: Value,
}

impl HandshakeResponse {
    /// Parse a handshake response body.
    pub fn parse(body: &[u8]) -> std::result::Result<Self, HandshakeError> {
        serde_json::from_slice(body).map_err(|e| HandshakeError::InvalidResponse(e.to_string()))
    }

    /// Map the status code onto success or a handshake error.
    pub fn check(&self) -> std::result::Result<(), HandshakeError> {
        match self.code {
            CODE_OK => Ok(()),
            CODE_OLD_CLIENT => Err(HandshakeError::OldClient),
            code => Err(HandshakeError::Rejected(code)),
        }
    }

    /// Negotiated heartbeat interval, if heartbeats are enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.sys
            .heartbeat
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
