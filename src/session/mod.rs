pub mod debug;
mod queue;
pub mod state;

pub use debug::{DebugContext, DebugSession};
pub use state::SessionState;
