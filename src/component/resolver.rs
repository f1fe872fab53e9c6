use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Failure raised while executing a command.
///
/// Resolver faults never terminate the runtime; they are caught at the loop
/// boundary and converted into an ordinary message via the component's
/// failure hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command {command} failed: {reason}")]
pub struct ResolverFailure {
    /// Debug rendering of the command that failed.
    pub command: String,
    /// Human-readable failure description.
    pub reason: String,
}

impl ResolverFailure {
    pub fn new(command: &impl fmt::Debug, reason: impl Into<String>) -> Self {
        Self {
            command: format!("{:?}", command),
            reason: reason.into(),
        }
    }
}

/// Executes commands produced by `update`, possibly with side effects.
///
/// Each command is submitted as an independent unit of work; the resulting
/// messages re-enter the component's queue when the work completes, so
/// completion order, not submission order, determines apply order.
#[async_trait]
pub trait Resolver<C, M>: Send + Sync {
    async fn resolve(&self, command: C) -> Result<Vec<M>, ResolverFailure>;
}
