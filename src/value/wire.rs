//! JSON wire form of the value tree.
//!
//! Every [`Value`] crosses the transport as `{"@type": <name>, "@value":
//! <payload>}`: `null` for `Null`, a JSON scalar for primitives, an array
//! for collections, and a `{property: <nested>}` object for `Ref`s. Scalars
//! decode by the `@type` hint first; a foreign type name falls back on the
//! JSON scalar shape so a peer can still display what it received.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Number};
use thiserror::Error;

use super::model::{PrimitiveKind, PrimitiveValue, Property, TypeName, Value};

/// A frame payload that does not parse as a wire-encoded value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("wire value is not a JSON object")]
    NotAnObject,

    #[error("wire value is missing `{0}`")]
    MissingField(&'static str),

    #[error("cannot interpret {payload} as a `{type_name}`")]
    UnsupportedPayload {
        type_name: TypeName,
        payload: String,
    },
}

impl Value {
    /// Encode into the `{"@type", "@value"}` wire object.
    pub fn to_wire(&self) -> serde_json::Value {
        let payload = match self {
            Value::Null { .. } => serde_json::Value::Null,
            Value::Primitive { value, .. } => match value {
                PrimitiveValue::Int(v) => json!(v),
                PrimitiveValue::Byte(v) => json!(v),
                PrimitiveValue::Short(v) => json!(v),
                PrimitiveValue::Char(v) => json!(v.to_string()),
                PrimitiveValue::Long(v) => json!(v),
                PrimitiveValue::Double(v) => json!(v),
                PrimitiveValue::Float(v) => json!(v),
                PrimitiveValue::String(v) => json!(v),
                PrimitiveValue::Boolean(v) => json!(v),
            },
            Value::Collection { items, .. } => {
                serde_json::Value::Array(items.iter().map(Value::to_wire).collect())
            }
            Value::Ref { properties, .. } => {
                let mut map = Map::with_capacity(properties.len());
                for property in properties {
                    map.insert(property.name.clone(), property.value.to_wire());
                }
                serde_json::Value::Object(map)
            }
        };

        json!({
            "@type": self.type_name().as_str(),
            "@value": payload,
        })
    }

    /// Decode a wire object back into a value tree.
    pub fn from_wire(json: &serde_json::Value) -> Result<Self, WireError> {
        let object = json.as_object().ok_or(WireError::NotAnObject)?;
        let type_name = object
            .get("@type")
            .and_then(serde_json::Value::as_str)
            .map(TypeName::new)
            .ok_or(WireError::MissingField("@type"))?;
        let payload = object.get("@value").unwrap_or(&serde_json::Value::Null);

        match payload {
            serde_json::Value::Null => Ok(Value::Null { type_name }),
            serde_json::Value::Bool(v) => Ok(Value::Primitive {
                type_name,
                value: PrimitiveValue::Boolean(*v),
            }),
            serde_json::Value::String(v) => Ok(string_value(type_name, v)),
            serde_json::Value::Number(v) => number_value(type_name, v),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(Value::from_wire).collect::<Result<_, _>>()?;
                Ok(Value::Collection { type_name, items })
            }
            serde_json::Value::Object(map) => {
                let properties = map
                    .iter()
                    .map(|(name, nested)| {
                        Value::from_wire(nested).map(|value| Property::new(name.clone(), value))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Value::Ref {
                    type_name,
                    properties,
                })
            }
        }
    }
}

fn string_value(type_name: TypeName, raw: &str) -> Value {
    // A one-character string tagged Char stays a Char.
    if PrimitiveKind::parse(type_name.as_str()) == Some(PrimitiveKind::Char) {
        let mut chars = raw.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Value::Primitive {
                type_name,
                value: PrimitiveValue::Char(c),
            };
        }
    }
    Value::Primitive {
        type_name,
        value: PrimitiveValue::String(raw.to_string()),
    }
}

fn number_value(type_name: TypeName, number: &Number) -> Result<Value, WireError> {
    let unsupported = || WireError::UnsupportedPayload {
        type_name: type_name.clone(),
        payload: number.to_string(),
    };

    let value = match PrimitiveKind::parse(type_name.as_str()) {
        Some(PrimitiveKind::Int) => PrimitiveValue::Int(
            number
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(unsupported)?,
        ),
        Some(PrimitiveKind::Byte) => PrimitiveValue::Byte(
            number
                .as_i64()
                .and_then(|v| i8::try_from(v).ok())
                .ok_or_else(unsupported)?,
        ),
        Some(PrimitiveKind::Short) => PrimitiveValue::Short(
            number
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .ok_or_else(unsupported)?,
        ),
        Some(PrimitiveKind::Long) => {
            PrimitiveValue::Long(number.as_i64().ok_or_else(unsupported)?)
        }
        Some(PrimitiveKind::Float) => {
            PrimitiveValue::Float(number.as_f64().ok_or_else(unsupported)? as f32)
        }
        Some(PrimitiveKind::Double) => {
            PrimitiveValue::Double(number.as_f64().ok_or_else(unsupported)?)
        }
        // A number under a foreign type name: keep the closest native kind
        // so the peer can at least display it.
        _ => match number.as_i64() {
            Some(v) => match i32::try_from(v) {
                Ok(v) => PrimitiveValue::Int(v),
                Err(_) => PrimitiveValue::Long(v),
            },
            None => PrimitiveValue::Double(number.as_f64().ok_or_else(unsupported)?),
        },
    };

    Ok(Value::Primitive { type_name, value })
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_wire(&json).map_err(D::Error::custom)
    }
}
