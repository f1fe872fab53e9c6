pub mod codec;
pub mod model;
pub mod wire;

pub use codec::{expect_ref, field, DecodeError, Describe, Reconstruct};
pub use model::{PrimitiveKind, PrimitiveValue, Property, TypeName, Value};
pub use wire::WireError;
