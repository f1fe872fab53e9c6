//! Protocol frames exchanged with the debug server.
//!
//! Each frame is one JSON object per WebSocket text message, discriminated
//! by a `type` field and carrying the originating or target component id,
//! so any number of components can share one transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Process-unique identifier scoping all protocol traffic for one runtime
/// instance. Stable for the instance's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Runtime → debugger frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once per successful handshake with the component's state at
    /// attach time.
    NotifyComponentAttached {
        component_id: ComponentId,
        state: Value,
    },

    /// One frame per observed state transition.
    NotifyComponentSnapshot {
        component_id: ComponentId,
        message: Value,
        old_state: Value,
        new_state: Value,
    },

    /// Acknowledges a successfully applied `ClientMessage`.
    ActionApplied { component_id: ComponentId },
}

impl ServerMessage {
    pub fn component_id(&self) -> ComponentId {
        match self {
            ServerMessage::NotifyComponentAttached { component_id, .. }
            | ServerMessage::NotifyComponentSnapshot { component_id, .. }
            | ServerMessage::ActionApplied { component_id } => *component_id,
        }
    }
}

/// Debugger → runtime frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Inject a message; it flows through `update` and the resolver as if
    /// received normally.
    ApplyMessage {
        component_id: ComponentId,
        message: Value,
    },

    /// Replace the component's state, bypassing `update` (rewind).
    ApplyState {
        component_id: ComponentId,
        state: Value,
    },
}

impl ClientMessage {
    pub fn component_id(&self) -> ComponentId {
        match self {
            ClientMessage::ApplyMessage { component_id, .. }
            | ClientMessage::ApplyState { component_id, .. } => *component_id,
        }
    }
}
