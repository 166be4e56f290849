//! Payload codecs.
//!
//! - [`encode`] / [`decode`]: the schema-driven binary codec
//! - [`JsonCodec`]: fallback for routes without a schema
//! - [`SchemaRegistry`]: picks between them per route and direction
//!
//! # Wire format
//!
//! A message is a sequence of fields. Each field starts with a varint header
//! `(tag << 3) | hint`; the hint is informational and decoding is driven by
//! the schema's declared type. Integers are varints (`sInt32` zigzagged),
//! `float`/`double` are little-endian fixed width, strings and nested
//! messages are varint-length prefixed.
//!
//! # Example
//!
//! ```
//! use routewire_client::codec::{decode, encode, SchemaSet};
//! use serde_json::json;
//!
//! let set = SchemaSet::from_json(&json!({
//!     "area.move": {
//!         "required sInt32 x": 1,
//!         "required sInt32 y": 2,
//!         "repeated uInt32 path": 3
//!     }
//! }))
//! .unwrap();
//! let schema = set.route("area.move").unwrap();
//!
//! let value = json!({ "x": -3, "y": 4, "path": [1, 2] });
//! let bytes = encode(&set, schema, &value).unwrap();
//! assert_eq!(decode(&set, schema, &bytes).unwrap(), value);
//! ```

mod decoder;
mod encoder;
mod json;
mod registry;
mod schema;
pub mod varint;

pub use decoder::decode;
pub use encoder::encode;
pub use json::JsonCodec;
pub use registry::SchemaRegistry;
pub use schema::{Cardinality, FieldDef, FieldType, MessageSchema, SchemaSet};
