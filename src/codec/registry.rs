//! Per-session schema registry.
//!
//! Two independent namespaces: `client` schemas encode outbound payloads,
//! `server` schemas decode inbound ones. A route missing from the relevant
//! namespace uses [`JsonCodec`].

use serde_json::Value;
use tracing::debug;

use super::json::JsonCodec;
use super::schema::SchemaSet;
use super::{decode, encode};
use crate::error::{CodecError, Result};

/// Immutable snapshot of the schemas negotiated in one handshake.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    version: u64,
    client: SchemaSet,
    server: SchemaSet,
}

impl SchemaRegistry {
    /// Registry with no schemas: every route is JSON.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(version: u64, client: SchemaSet, server: SchemaSet) -> Self {
        Self {
            version,
            client,
            server,
        }
    }

    /// Build from the handshake `protos` maps.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` if either map cannot be parsed. Nothing is installed
    /// in that case.
    pub fn from_protos(version: u64, client: &Value, server: &Value) -> std::result::Result<Self, CodecError> {
        let client = SchemaSet::from_json(client)?;
        let server = SchemaSet::from_json(server)?;
        debug!(
            version,
            client_routes = client.len(),
            server_routes = server.len(),
            "Schemas installed"
        );
        Ok(Self::new(version, client, server))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether outbound payloads for `route` use the binary codec.
    pub fn encodes(&self, route: &str) -> bool {
        self.client.route(route).is_some()
    }

    /// Whether inbound payloads for `route` use the binary codec.
    pub fn decodes(&self, route: &str) -> bool {
        self.server.route(route).is_some()
    }

    /// Encode an outbound payload for `route`.
    pub fn encode_body(&self, route: &str, value: &Value) -> Result<Vec<u8>> {
        match self.client.route(route) {
            Some(schema) => Ok(encode(&self.client, schema, value)?),
            None => JsonCodec::encode(value),
        }
    }

    /// Decode an inbound payload for `route`.
    pub fn decode_body(&self, route: &str, body: &[u8]) -> Result<Value> {
        match self.server.route(route) {
            Some(schema) => Ok(decode(&self.server, schema, body)?),
            None => JsonCodec::decode_body(body),
        }
    }
}
