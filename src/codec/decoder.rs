//! Schema-driven decoder, the inverse of [`encode`](super::encode).
//!
//! Decoding stays inside the current message boundary: a nested message's
//! declared length must fit inside its parent and be consumed exactly.

use serde_json::{Map, Number, Value};

use super::schema::{Cardinality, FieldDef, FieldType, MessageSchema, SchemaSet};
use super::varint::{decode_varint, zigzag_decode};
use crate::error::CodecError;

/// Decode `buf` against `schema`, resolving nested types through `set`.
///
/// Absent optional fields are omitted from the result; a repeated field that
/// never appears is omitted too.
///
/// # Errors
///
/// `MalformedPayload` on truncation, length overrun or invalid UTF-8,
/// `UnknownField` for a tag the schema does not declare, and
/// `UnknownMessageType` for an unresolvable nested type.
pub fn decode(set: &SchemaSet, schema: &MessageSchema, buf: &[u8]) -> Result<Value, CodecError> {
    let mut decoder = Decoder {
        set,
        scopes: Vec::new(),
        buf,
        offset: 0,
        end: buf.len(),
    };
    decoder.message(schema, buf.len())
}

struct Decoder<'a, 'b> {
    set: &'a SchemaSet,
    scopes: Vec<&'a MessageSchema>,
    buf: &'b [u8],
    offset: usize,
    /// Boundary of the message currently being decoded.
    end: usize,
}

impl<'a, 'b> Decoder<'a, 'b> {
    fn message(&mut self, schema: &'a MessageSchema, end: usize) -> Result<Value, CodecError> {
        let outer_end = std::mem::replace(&mut self.end, end);
        self.scopes.push(schema);
        let result = self.fields(schema);
        self.scopes.pop();
        self.end = outer_end;
        result.map(Value::Object)
    }

    fn fields(&mut self, schema: &'a MessageSchema) -> Result<Map<String, Value>, CodecError> {
        let mut object = Map::new();

        while self.offset < self.end {
            let head = self.varint()?;
            let tag = u32::try_from(head >> 3)
                .map_err(|_| CodecError::MalformedPayload(format!("tag header {head} out of range")))?;
            let field = schema.field_by_tag(tag).ok_or(CodecError::UnknownField(tag))?;

            match field.cardinality {
                Cardinality::Required | Cardinality::Optional => {
                    let value = self.value(field)?;
                    object.insert(field.name.clone(), value);
                }
                Cardinality::Repeated => {
                    let mut decoded = Vec::new();
                    if field.field_type.is_scalar() {
                        let count = self.varint()?;
                        for _ in 0..count {
                            decoded.push(self.value(field)?);
                        }
                    } else {
                        decoded.push(self.value(field)?);
                    }

                    match object.get_mut(&field.name) {
                        Some(Value::Array(items)) => items.extend(decoded),
                        _ => {
                            object.insert(field.name.clone(), Value::Array(decoded));
                        }
                    }
                }
            }
        }

        if self.offset != self.end {
            return Err(CodecError::MalformedPayload(
                "field overruns message boundary".to_string(),
            ));
        }
        Ok(object)
    }

    fn value(&mut self, field: &'a FieldDef) -> Result<Value, CodecError> {
        let value = match &field.field_type {
            FieldType::UInt32 => {
                let v = self.varint()?;
                let v = u32::try_from(v).map_err(|_| {
                    CodecError::MalformedPayload(format!("`{}` exceeds 32 bits", field.name))
                })?;
                Value::from(v)
            }
            FieldType::SInt32 => {
                let v = zigzag_decode(self.varint()?);
                let v = i32::try_from(v).map_err(|_| {
                    CodecError::MalformedPayload(format!("`{}` exceeds 32 bits", field.name))
                })?;
                Value::from(v)
            }
            FieldType::Float => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                float_value(f64::from(f32::from_le_bytes(raw)))
            }
            FieldType::Double => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                float_value(f64::from_le_bytes(raw))
            }
            FieldType::String => {
                let len = self.length()?;
                let bytes = self.take(len)?;
                let s = std::str::from_utf8(bytes).map_err(|e| {
                    CodecError::MalformedPayload(format!("`{}` is not UTF-8: {e}", field.name))
                })?;
                Value::String(s.to_string())
            }
            FieldType::Message(type_name) => {
                let len = self.length()?;
                let end = self
                    .offset
                    .checked_add(len)
                    .filter(|end| *end <= self.end)
                    .ok_or_else(|| {
                        CodecError::MalformedPayload(format!(
                            "`{}` length {len} overruns its parent",
                            field.name
                        ))
                    })?;
                let schema = self.set.resolve(&self.scopes, type_name)?;
                self.message(schema, end)?
            }
        };
        Ok(value)
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let (value, read) = decode_varint(&self.buf[self.offset..self.end])?;
        self.offset += read;
        Ok(value)
    }

    fn length(&mut self) -> Result<usize, CodecError> {
        let len = self.varint()?;
        usize::try_from(len)
            .map_err(|_| CodecError::MalformedPayload(format!("length {len} out of range")))
    }

    fn take(&mut self, len: usize) -> Result<&'b [u8], CodecError> {
        let remaining = self.end - self.offset;
        if len > remaining {
            return Err(CodecError::MalformedPayload(format!(
                "need {len} bytes, {remaining} remain"
            )));
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.buf[start..self.offset])
    }
}

/// Non-finite values have no JSON form.
fn float_value(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use serde_json::json;

    fn schema(value: Value) -> MessageSchema {
        MessageSchema::from_json(&value).unwrap()
    }

    #[test]
    fn test_decode_nested_and_repeated() {
        let set = SchemaSet::from_json(&json!({
            "message Point": { "required sInt32 x": 1, "required sInt32 y": 2 }
        }))
        .unwrap();
        let s = schema(json!({
            "required string name": 1,
            "repeated uInt32 scores": 2,
            "repeated Point path": 3,
            "optional double weight": 4
        }));
        let value = json!({
            "name": "zoë",
            "scores": [0, 7, 4_000_000_000u32],
            "path": [{ "x": -5, "y": 3 }, { "x": 0, "y": 0 }],
            "weight": 0.25
        });

        let bytes = encode(&set, &s, &value).unwrap();
        assert_eq!(decode(&set, &s, &bytes).unwrap(), value);
    }

    #[test]
    fn test_roundtrip_table() {
        let set = SchemaSet::from_json(&json!({
            "message Item": {
                "required uInt32 id": 1,
                "repeated sInt32 deltas": 2,
                "repeated Tag tags": 3,
                "message Tag": { "optional string label": 1 }
            }
        }))
        .unwrap();

        let cases = [
            (
                json!({ "required uInt32 v": 1 }),
                vec![json!({ "v": 0 }), json!({ "v": 127 }), json!({ "v": u32::MAX })],
            ),
            (
                json!({ "required sInt32 v": 1 }),
                vec![
                    json!({ "v": i32::MIN }),
                    json!({ "v": -1 }),
                    json!({ "v": 0 }),
                    json!({ "v": i32::MAX }),
                ],
            ),
            (
                json!({ "optional string s": 1, "optional double d": 2 }),
                vec![
                    json!({}),
                    json!({ "s": "" }),
                    json!({ "s": "héllo wörld", "d": -1.5e300 }),
                    json!({ "d": 0.0 }),
                ],
            ),
            (
                json!({ "repeated uInt32 a": 1, "repeated float f": 2 }),
                vec![
                    json!({ "a": [] }),
                    json!({ "a": [0, 1, u32::MAX], "f": [0.5, -2.25] }),
                    json!({ "f": [] }),
                ],
            ),
            (
                json!({ "repeated Item items": 1, "optional Item head": 2 }),
                vec![
                    json!({ "head": { "id": u32::MAX } }),
                    json!({ "head": { "id": 1, "deltas": [], "tags": [{}] } }),
                    json!({
                        "items": [
                            { "id": 0, "deltas": [i32::MIN, i32::MAX] },
                            { "id": 2, "tags": [{ "label": "" }, { "label": "b" }] }
                        ]
                    }),
                ],
            ),
        ];

        for (schema_json, values) in cases {
            let s = schema(schema_json);
            for value in values {
                let bytes = encode(&set, &s, &value).unwrap();
                assert_eq!(decode(&set, &s, &bytes).unwrap(), value, "bytes: {bytes:02X?}");
            }
        }
    }

    #[test]
    fn test_absent_optional_is_omitted() {
        let s = schema(json!({ "required uInt32 a": 1, "optional string b": 2 }));
        let decoded = decode(&SchemaSet::new(), &s, &[0x08, 0x05]).unwrap();
        assert_eq!(decoded, json!({ "a": 5 }));
    }

    #[test]
    fn test_float_is_single_precision() {
        let s = schema(json!({ "required float f": 1 }));
        let bytes = encode(&SchemaSet::new(), &s, &json!({ "f": 0.5 })).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(decode(&SchemaSet::new(), &s, &bytes).unwrap(), json!({ "f": 0.5 }));
    }

    #[test]
    fn test_unknown_tag() {
        let s = schema(json!({ "required uInt32 a": 1 }));
        assert_eq!(
            decode(&SchemaSet::new(), &s, &[0x10, 0x01]).unwrap_err(),
            CodecError::UnknownField(2)
        );
    }

    #[test]
    fn test_truncated_inputs_are_malformed() {
        let s = schema(json!({ "required string a": 1, "required double b": 2 }));
        let set = SchemaSet::new();
        for buf in [&[0x0A, 0x05, b'a'][..], &[0x11, 0x00, 0x00], &[0x0A]] {
            assert!(matches!(
                decode(&set, &s, buf),
                Err(CodecError::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let s = schema(json!({ "required string a": 1 }));
        assert!(matches!(
            decode(&SchemaSet::new(), &s, &[0x0A, 0x02, 0xC3, 0x28]),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_nested_length_must_fit_parent() {
        let s = schema(json!({
            "required Inner i": 1,
            "message Inner": { "required uInt32 v": 1 }
        }));
        // Declared length 9 but only 2 bytes follow
        assert!(matches!(
            decode(&SchemaSet::new(), &s, &[0x0A, 0x09, 0x08, 0x01]),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_nested_field_cannot_cross_boundary() {
        let s = schema(json!({
            "required Inner i": 1,
            "required uInt32 after": 2,
            "message Inner": { "required string s": 1 }
        }));
        // Inner claims 2 bytes, but its string wants 3
        let buf = [0x0A, 0x02, 0x0A, 0x03, b'a', b'b', b'c'];
        assert!(matches!(
            decode(&SchemaSet::new(), &s, &buf),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_empty_buffer_decodes_empty_object() {
        let s = schema(json!({ "optional uInt32 a": 1 }));
        assert_eq!(decode(&SchemaSet::new(), &s, &[]).unwrap(), json!({}));
    }

    #[test]
    fn test_empty_packed_array() {
        let s = schema(json!({ "repeated sInt32 v": 1 }));
        assert_eq!(
            decode(&SchemaSet::new(), &s, &[0x08, 0x00]).unwrap(),
            json!({ "v": [] })
        );
    }
}
