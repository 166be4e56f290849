//! Message schemas and their JSON text form.
//!
//! A message schema is a JSON object whose keys declare fields or nested
//! message types:
//!
//! ```text
//! {
//!   "required uInt32 id": 1,
//!   "optional string name": 2,
//!   "repeated Item items": 3,
//!   "message Item": { "required sInt32 delta": 1 }
//! }
//! ```
//!
//! A protos map (one per direction) maps route names to such objects; its
//! `"message <Name>"` keys define messages shared by every route.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::CodecError;

/// Declared wire type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned varint.
    UInt32,
    /// Zigzag varint (`int32` and `sInt32` on the wire are the same).
    SInt32,
    /// 4-byte little-endian IEEE float.
    Float,
    /// 8-byte little-endian IEEE double.
    Double,
    /// Varint length followed by UTF-8 bytes.
    String,
    /// Length-prefixed nested message, by type name.
    Message(String),
}

impl FieldType {
    fn parse(token: &str) -> Self {
        match token {
            "uInt32" => Self::UInt32,
            "int32" | "sInt32" => Self::SInt32,
            "float" => Self::Float,
            "double" => Self::Double,
            "string" => Self::String,
            other => Self::Message(other.to_string()),
        }
    }

    /// Scalars repeat packed; messages repeat one tag per element.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Message(_))
    }

    /// Low 3 bits written into the tag header.
    #[inline]
    pub fn wire_hint(&self) -> u64 {
        match self {
            Self::UInt32 | Self::SInt32 => 0,
            Self::Double => 1,
            Self::String | Self::Message(_) => 2,
            Self::Float => 5,
        }
    }
}

/// Field cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Required,
    Optional,
    Repeated,
}

impl Cardinality {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "repeated" => Some(Self::Repeated),
            _ => None,
        }
    }
}

/// A single field of a message schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub tag: u32,
    pub field_type: FieldType,
    pub cardinality: Cardinality,
}

/// A named set of fields plus the message types declared inside it.
///
/// Immutable once built. Fields are kept in ascending tag order, which is the
/// order the encoder writes them in.
#[derive(Debug, Default)]
pub struct MessageSchema {
    fields: Vec<FieldDef>,
    by_tag: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
    nested: HashMap<String, Arc<MessageSchema>>,
}

impl MessageSchema {
    /// Build a schema from field definitions and nested message types.
    ///
    /// # Errors
    ///
    /// `InvalidSchema` on a zero, duplicate or out-of-range tag, or a
    /// duplicate field name.
    pub fn new(
        mut fields: Vec<FieldDef>,
        nested: HashMap<String, Arc<MessageSchema>>,
    ) -> Result<Self, CodecError> {
        fields.sort_by_key(|f| f.tag);

        let mut by_tag = HashMap::with_capacity(fields.len());
        let mut by_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if field.tag == 0 || field.tag > (u32::MAX >> 3) {
                return Err(CodecError::InvalidSchema(format!(
                    "field `{}` has invalid tag {}",
                    field.name, field.tag
                )));
            }
            if by_tag.insert(field.tag, index).is_some() {
                return Err(CodecError::InvalidSchema(format!(
                    "tag {} declared twice",
                    field.tag
                )));
            }
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(CodecError::InvalidSchema(format!(
                    "field `{}` declared twice",
                    field.name
                )));
            }
        }

        Ok(Self {
            fields,
            by_tag,
            by_name,
            nested,
        })
    }

    /// Parse a schema object in text form.
    pub fn from_json(value: &Value) -> Result<Self, CodecError> {
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::InvalidSchema("message schema must be an object".into()))?;
        Self::from_object(object)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, CodecError> {
        let mut fields = Vec::new();
        let mut nested = HashMap::new();

        for (key, value) in object {
            let parts: Vec<&str> = key.split_whitespace().collect();
            match parts.as_slice() {
                ["message", name] => {
                    let schema = Self::from_json(value)?;
                    nested.insert((*name).to_string(), Arc::new(schema));
                }
                [cardinality, type_name, name] => {
                    let cardinality = Cardinality::parse(cardinality).ok_or_else(|| {
                        CodecError::InvalidSchema(format!("unknown cardinality in `{key}`"))
                    })?;
                    let tag = value
                        .as_u64()
                        .and_then(|t| u32::try_from(t).ok())
                        .ok_or_else(|| {
                            CodecError::InvalidSchema(format!("`{key}` needs an integer tag"))
                        })?;
                    fields.push(FieldDef {
                        name: (*name).to_string(),
                        tag,
                        field_type: FieldType::parse(type_name),
                        cardinality,
                    });
                }
                _ => {
                    return Err(CodecError::InvalidSchema(format!(
                        "unrecognised schema key `{key}`"
                    )))
                }
            }
        }

        Self::new(fields, nested)
    }

    /// Fields in ascending tag order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&FieldDef> {
        self.by_tag.get(&tag).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Message type declared directly inside this one.
    pub fn nested(&self, name: &str) -> Option<&MessageSchema> {
        self.nested.get(name).map(Arc::as_ref)
    }
}

/// One direction's worth of schemas: per-route messages plus shared types.
#[derive(Debug, Default)]
pub struct SchemaSet {
    routes: HashMap<String, Arc<MessageSchema>>,
    messages: HashMap<String, Arc<MessageSchema>>,
}

impl SchemaSet {
    /// Create an empty set (every route falls back to JSON).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a protos map as delivered in the handshake.
    ///
    /// `null` yields an empty set.
    pub fn from_json(value: &Value) -> Result<Self, CodecError> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            _ => return Err(CodecError::InvalidSchema("protos must be an object".into())),
        };

        let mut set = Self::new();
        for (key, schema) in object {
            let parsed = Arc::new(MessageSchema::from_json(schema)?);
            match key.strip_prefix("message ") {
                Some(name) => set.messages.insert(name.trim().to_string(), parsed),
                None => set.routes.insert(key.clone(), parsed),
            };
        }
        Ok(set)
    }

    /// Schema for a route, if the route uses the binary codec.
    pub fn route(&self, route: &str) -> Option<&MessageSchema> {
        self.routes.get(route).map(Arc::as_ref)
    }

    /// Resolve a message type name from inside `scopes` (outermost first).
    ///
    /// Innermost scope wins, then enclosing scopes, then shared messages.
    pub fn resolve<'a>(
        &'a self,
        scopes: &[&'a MessageSchema],
        name: &str,
    ) -> Result<&'a MessageSchema, CodecError> {
        scopes
            .iter()
            .rev()
            .copied()
            .find_map(|scope| scope.nested(name))
            .or_else(|| self.messages.get(name).map(Arc::as_ref))
            .ok_or_else(|| CodecError::UnknownMessageType(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fields_and_nested() {
        let schema = MessageSchema::from_json(&json!({
            "optional string name": 2,
            "required uInt32 id": 1,
            "repeated Item items": 3,
            "message Item": { "required sInt32 delta": 1 }
        }))
        .unwrap();

        let tags: Vec<u32> = schema.fields().iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);

        let items = schema.field_by_name("items").unwrap();
        assert_eq!(items.cardinality, Cardinality::Repeated);
        assert_eq!(items.field_type, FieldType::Message("Item".into()));
        assert_eq!(schema.field_by_tag(2).unwrap().name, "name");
        assert!(schema.nested("Item").is_some());
    }

    #[test]
    fn test_int32_aliases_zigzag() {
        let schema = MessageSchema::from_json(&json!({
            "required int32 a": 1,
            "required sInt32 b": 2
        }))
        .unwrap();
        assert_eq!(schema.field_by_tag(1).unwrap().field_type, FieldType::SInt32);
        assert_eq!(schema.field_by_tag(2).unwrap().field_type, FieldType::SInt32);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let result = MessageSchema::from_json(&json!({
            "required uInt32 a": 1,
            "required uInt32 b": 1
        }));
        assert!(matches!(result, Err(CodecError::InvalidSchema(_))));
    }

    #[test]
    fn test_bad_keys_rejected() {
        assert!(MessageSchema::from_json(&json!({ "sometimes uInt32 a": 1 })).is_err());
        assert!(MessageSchema::from_json(&json!({ "uInt32 a": 1 })).is_err());
        assert!(MessageSchema::from_json(&json!({ "required uInt32 a": "one" })).is_err());
        assert!(MessageSchema::from_json(&json!({ "required uInt32 a": 0 })).is_err());
        assert!(MessageSchema::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_schema_set_routes_and_shared_messages() {
        let set = SchemaSet::from_json(&json!({
            "area.playerHandler.move": { "required Point to": 1 },
            "message Point": { "required float x": 1, "required float y": 2 }
        }))
        .unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.route("area.playerHandler.move").is_some());
        assert!(set.route("message Point").is_none());
        assert!(set.resolve(&[], "Point").is_ok());
    }

    #[test]
    fn test_resolve_prefers_innermost_scope() {
        let set = SchemaSet::from_json(&json!({
            "r": {
                "required Inner a": 1,
                "message Inner": { "required uInt32 inner": 1 }
            },
            "message Inner": { "required string shared": 1 }
        }))
        .unwrap();

        let route = set.route("r").unwrap();
        let resolved = set.resolve(&[route], "Inner").unwrap();
        assert!(resolved.field_by_name("inner").is_some());

        let shared = set.resolve(&[], "Inner").unwrap();
        assert!(shared.field_by_name("shared").is_some());
    }

    #[test]
    fn test_resolve_unknown_type() {
        let set = SchemaSet::new();
        assert_eq!(
            set.resolve(&[], "Ghost").unwrap_err(),
            CodecError::UnknownMessageType("Ghost".into())
        );
    }

    #[test]
    fn test_null_protos_is_empty() {
        let set = SchemaSet::from_json(&Value::Null).unwrap();
        assert!(set.is_empty());
        assert!(SchemaSet::from_json(&json!(3)).is_err());
    }
}
