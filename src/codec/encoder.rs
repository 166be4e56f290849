//! Schema-driven encoder.
//!
//! Walks the schema (not the value) so output is deterministic: fields are
//! written in ascending tag order regardless of the value's key order.
//!
//! Per field: a varint tag header `(tag << 3) | wire_hint`, then
//! - `required`/`optional`: one value;
//! - `repeated` scalar: one header, a varint count, then the values (packed);
//! - `repeated` message: one header plus one value per element (unpacked).

use serde_json::{Map, Value};

use super::schema::{Cardinality, FieldDef, FieldType, MessageSchema, SchemaSet};
use super::varint::{encode_varint, zigzag_encode};
use crate::error::CodecError;

/// Encode `value` against `schema`, resolving nested types through `set`.
///
/// # Errors
///
/// `MissingRequiredField` when a required field is absent or `null`,
/// `UnknownMessageType` for an unresolvable nested type, `InvalidValue` when
/// a value does not fit its declared wire type.
///
/// # Example
///
/// ```
/// use routewire_client::codec::{encode, MessageSchema, SchemaSet};
/// use serde_json::json;
///
/// let schema = MessageSchema::from_json(&json!({ "required uInt32 x": 1 })).unwrap();
/// let bytes = encode(&SchemaSet::new(), &schema, &json!({ "x": 150 })).unwrap();
/// assert_eq!(bytes, [0x08, 0x96, 0x01]);
/// ```
pub fn encode(set: &SchemaSet, schema: &MessageSchema, value: &Value) -> Result<Vec<u8>, CodecError> {
    let object = value.as_object().ok_or_else(|| CodecError::InvalidValue {
        field: String::new(),
        expected: "an object",
    })?;

    let mut encoder = Encoder {
        set,
        scopes: Vec::new(),
    };
    let mut out = Vec::new();
    encoder.message(schema, object, &mut out)?;
    Ok(out)
}

struct Encoder<'a> {
    set: &'a SchemaSet,
    scopes: Vec<&'a MessageSchema>,
}

impl<'a> Encoder<'a> {
    fn message(
        &mut self,
        schema: &'a MessageSchema,
        object: &Map<String, Value>,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        self.scopes.push(schema);
        let result = self.fields(schema, object, out);
        self.scopes.pop();
        result
    }

    fn fields(
        &mut self,
        schema: &'a MessageSchema,
        object: &Map<String, Value>,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        for field in schema.fields() {
            let value = match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.cardinality == Cardinality::Required {
                        return Err(CodecError::MissingRequiredField(field.name.clone()));
                    }
                    continue;
                }
                Some(value) => value,
            };

            match field.cardinality {
                Cardinality::Required | Cardinality::Optional => {
                    write_header(field, out);
                    self.value(field, value, out)?;
                }
                Cardinality::Repeated => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| invalid(field, "an array"))?;

                    if field.field_type.is_scalar() {
                        write_header(field, out);
                        encode_varint(items.len() as u64, out);
                        for item in items {
                            self.value(field, item, out)?;
                        }
                    } else {
                        for item in items {
                            write_header(field, out);
                            self.value(field, item, out)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn value(&mut self, field: &'a FieldDef, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match &field.field_type {
            FieldType::UInt32 => {
                let v = value
                    .as_u64()
                    .filter(|v| *v <= u64::from(u32::MAX))
                    .ok_or_else(|| invalid(field, "an unsigned 32-bit integer"))?;
                encode_varint(v, out);
            }
            FieldType::SInt32 => {
                let v = value
                    .as_i64()
                    .filter(|v| i32::try_from(*v).is_ok())
                    .ok_or_else(|| invalid(field, "a signed 32-bit integer"))?;
                encode_varint(zigzag_encode(v), out);
            }
            FieldType::Float => {
                let v = value.as_f64().ok_or_else(|| invalid(field, "a number"))?;
                out.extend_from_slice(&(v as f32).to_le_bytes());
            }
            FieldType::Double => {
                let v = value.as_f64().ok_or_else(|| invalid(field, "a number"))?;
                out.extend_from_slice(&v.to_le_bytes());
            }
            FieldType::String => {
                let s = value.as_str().ok_or_else(|| invalid(field, "a string"))?;
                encode_varint(s.len() as u64, out);
                out.extend_from_slice(s.as_bytes());
            }
            FieldType::Message(type_name) => {
                let object = value
                    .as_object()
                    .ok_or_else(|| invalid(field, "an object"))?;
                let schema = self.set.resolve(&self.scopes, type_name)?;

                let mut nested = Vec::new();
                self.message(schema, object, &mut nested)?;
                encode_varint(nested.len() as u64, out);
                out.extend_from_slice(&nested);
            }
        }
        Ok(())
    }
}

#[inline]
fn write_header(field: &FieldDef, out: &mut Vec<u8>) {
    encode_varint((u64::from(field.tag) << 3) | field.field_type.wire_hint(), out);
}

fn invalid(field: &FieldDef, expected: &'static str) -> CodecError {
    CodecError::InvalidValue {
        field: field.name.clone(),
        expected,
    }
}
