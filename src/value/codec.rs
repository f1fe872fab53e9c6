//! Per-type encode/decode capabilities.
//!
//! Instead of runtime reflection, every type crossing the debug protocol
//! implements [`Describe`] (lower into a [`Value`] tree) and, on the
//! application side, [`Reconstruct`] (rebuild the concrete value from a
//! tree). Reconstruction is strict: a misreconstructed state injected back
//! into a live runtime would corrupt its invariants, so every expected
//! property must be present with the exact primitive kind.

use thiserror::Error;

use super::model::{PrimitiveKind, PrimitiveValue, TypeName, Value};

/// Why a [`Value`] tree could not be rebuilt into a concrete type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The tree names a type the decoding side cannot resolve.
    #[error("unknown type `{0}`")]
    UnknownType(TypeName),

    /// A `Ref` lacks a property the target type expects.
    #[error("missing property `{property}` on `{type_name}`")]
    MissingProperty {
        type_name: TypeName,
        property: String,
    },

    /// A primitive was stored with a different kind than the target.
    #[error("kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: PrimitiveKind,
        found: PrimitiveKind,
    },

    /// The tree's shape does not fit the target at all, e.g. `Null` into a
    /// non-optional target.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Lowers a concrete value into a [`Value`] tree.
///
/// The contract assumes the described data is an owned, acyclic graph;
/// `describe` walks `&self` and terminates because the walked structure
/// does. Implementations for composite types build a `Ref` with properties
/// in declaration order.
pub trait Describe {
    /// Declared-type descriptor attached to the produced tree.
    fn type_name() -> TypeName;

    fn describe(&self) -> Value;
}

/// Rebuilds a concrete value from a [`Value`] tree, strictly.
pub trait Reconstruct: Sized {
    fn reconstruct(value: &Value) -> Result<Self, DecodeError>;
}

/// Checks that `value` is a `Ref` of the expected type.
///
/// Returns `UnknownType` for a `Ref` of any other name and `TypeMismatch`
/// for non-`Ref` shapes.
pub fn expect_ref(value: &Value, expected: &TypeName) -> Result<(), DecodeError> {
    match value {
        Value::Ref { type_name, .. } if type_name == expected => Ok(()),
        Value::Ref { type_name, .. } => Err(DecodeError::UnknownType(type_name.clone())),
        other => Err(DecodeError::TypeMismatch {
            expected: "Ref",
            found: other.shape(),
        }),
    }
}

/// Looks up a named property on a `Ref` and reconstructs it.
pub fn field<T: Reconstruct>(value: &Value, name: &str) -> Result<T, DecodeError> {
    match value {
        Value::Ref {
            type_name,
            properties,
        } => match properties.iter().find(|p| p.name == name) {
            Some(property) => T::reconstruct(&property.value),
            None => Err(DecodeError::MissingProperty {
                type_name: type_name.clone(),
                property: name.to_string(),
            }),
        },
        other => Err(DecodeError::TypeMismatch {
            expected: "Ref",
            found: other.shape(),
        }),
    }
}

macro_rules! primitive_codec {
    ($ty:ty, $kind:ident) => {
        impl Describe for $ty {
            fn type_name() -> TypeName {
                PrimitiveKind::$kind.type_name()
            }

            fn describe(&self) -> Value {
                Value::from(PrimitiveValue::$kind(self.clone()))
            }
        }

        impl Reconstruct for $ty {
            fn reconstruct(value: &Value) -> Result<Self, DecodeError> {
                match value {
                    Value::Primitive {
                        value: PrimitiveValue::$kind(v),
                        ..
                    } => Ok(v.clone()),
                    Value::Primitive { value: other, .. } => Err(DecodeError::KindMismatch {
                        expected: PrimitiveKind::$kind,
                        found: other.kind(),
                    }),
                    other => Err(DecodeError::TypeMismatch {
                        expected: PrimitiveKind::$kind.as_str(),
                        found: other.shape(),
                    }),
                }
            }
        }
    };
}

primitive_codec!(i32, Int);
primitive_codec!(i8, Byte);
primitive_codec!(i16, Short);
primitive_codec!(char, Char);
primitive_codec!(i64, Long);
primitive_codec!(f64, Double);
primitive_codec!(f32, Float);
primitive_codec!(String, String);
primitive_codec!(bool, Boolean);

impl<T: Describe> Describe for Option<T> {
    fn type_name() -> TypeName {
        T::type_name()
    }

    fn describe(&self) -> Value {
        match self {
            Some(inner) => inner.describe(),
            None => Value::null(T::type_name()),
        }
    }
}

impl<T: Reconstruct> Reconstruct for Option<T> {
    fn reconstruct(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null { .. } => Ok(None),
            other => T::reconstruct(other).map(Some),
        }
    }
}

// The declared element type tags the collection, matching how the wire
// carries per-element tags anyway.
impl<T: Describe> Describe for Vec<T> {
    fn type_name() -> TypeName {
        T::type_name()
    }

    fn describe(&self) -> Value {
        Value::collection(T::type_name(), self.iter().map(Describe::describe).collect())
    }
}

impl<T: Reconstruct> Reconstruct for Vec<T> {
    fn reconstruct(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Collection { items, .. } => items.iter().map(T::reconstruct).collect(),
            other => Err(DecodeError::TypeMismatch {
                expected: "Collection",
                found: other.shape(),
            }),
        }
    }
}
