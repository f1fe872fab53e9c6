pub mod messages;

pub use messages::{ClientMessage, ComponentId, ServerMessage};
