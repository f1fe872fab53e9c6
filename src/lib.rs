pub mod component;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod value;

pub use component::{Component, Resolver, ResolverFailure, Transition};
pub use config::{DebugConfig, ReconnectPolicy};
pub use protocol::{ClientMessage, ComponentId, ServerMessage};
pub use session::{DebugContext, DebugSession, SessionState};
pub use transport::{ConnectionStatus, Multiplexer, TransportError};
pub use value::{DecodeError, Describe, Reconstruct, TypeName, Value};
