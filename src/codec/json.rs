//! JSON codec, used for every route that has no schema in the active
//! direction and for the handshake bodies.
//!
//! # Example
//!
//! ```
//! use routewire_client::codec::JsonCodec;
//! use serde_json::{json, Value};
//!
//! let encoded = JsonCodec::encode(&json!({ "uid": 7 })).unwrap();
//! let decoded: Value = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded["uid"], 7);
//! ```

use serde_json::Value;

use crate::error::Result;

/// UTF-8 JSON codec.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value as compact UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode UTF-8 JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode a message body; an empty body is `null`.
    pub fn decode_body(bytes: &[u8]) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Self::decode(bytes)
    }
}
