pub mod connection;
pub mod multiplexer;

pub use connection::{ConnectionStatus, TransportError};
pub use multiplexer::{Multiplexer, SessionChannels};
