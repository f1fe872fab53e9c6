pub mod resolver;
pub mod runtime;

pub use resolver::{Resolver, ResolverFailure};
pub use runtime::{Component, ComponentBuilder, Transition};
