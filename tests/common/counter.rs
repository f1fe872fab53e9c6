//! The counter fixture: a minimal TEA application used across the
//! integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rewind::component::{Component, Resolver, ResolverFailure};
use rewind::value::{expect_ref, field, DecodeError, Describe, Reconstruct, TypeName, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct CounterState {
    pub count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CounterMsg {
    Increment,
    Decrement,
    /// Apply a delta directly.
    Add(i32),
    /// Ask the resolver to produce an `Add` later.
    SpawnAdd(i32),
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum CounterCmd {
    Delayed(i32),
    Fail,
}

pub fn update(message: &CounterMsg, state: &CounterState) -> (CounterState, Vec<CounterCmd>) {
    match message {
        CounterMsg::Increment => (
            CounterState {
                count: state.count + 1,
            },
            vec![],
        ),
        CounterMsg::Decrement => (
            CounterState {
                count: state.count - 1,
            },
            vec![],
        ),
        CounterMsg::Add(delta) => (
            CounterState {
                count: state.count + delta,
            },
            vec![],
        ),
        CounterMsg::SpawnAdd(delta) => (state.clone(), vec![CounterCmd::Delayed(*delta)]),
        CounterMsg::Failed(_) => (state.clone(), vec![]),
    }
}

pub struct CounterResolver;

#[async_trait]
impl Resolver<CounterCmd, CounterMsg> for CounterResolver {
    async fn resolve(&self, command: CounterCmd) -> Result<Vec<CounterMsg>, ResolverFailure> {
        match command {
            CounterCmd::Delayed(delta) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(vec![CounterMsg::Add(delta)])
            }
            CounterCmd::Fail => Err(ResolverFailure::new(&command, "refused")),
        }
    }
}

pub fn spawn_counter() -> Component<CounterState, CounterMsg> {
    Component::builder(
        CounterState { count: 0 },
        update,
        Arc::new(CounterResolver),
        |failure: ResolverFailure| CounterMsg::Failed(failure.reason),
    )
    .spawn()
}

impl Describe for CounterState {
    fn type_name() -> TypeName {
        TypeName::new("State")
    }

    fn describe(&self) -> Value {
        Value::record("State", vec![("count", self.count.describe())])
    }
}

impl Reconstruct for CounterState {
    fn reconstruct(value: &Value) -> Result<Self, DecodeError> {
        expect_ref(value, &Self::type_name())?;
        Ok(Self {
            count: field(value, "count")?,
        })
    }
}

impl Describe for CounterMsg {
    fn type_name() -> TypeName {
        TypeName::new("Message")
    }

    // Each variant describes as its own record, the way a sealed hierarchy
    // serializes per concrete subtype.
    fn describe(&self) -> Value {
        match self {
            CounterMsg::Increment => Value::record("Increment", Vec::<(&str, Value)>::new()),
            CounterMsg::Decrement => Value::record("Decrement", Vec::<(&str, Value)>::new()),
            CounterMsg::Add(delta) => Value::record("Add", vec![("amount", delta.describe())]),
            CounterMsg::SpawnAdd(delta) => {
                Value::record("SpawnAdd", vec![("amount", delta.describe())])
            }
            CounterMsg::Failed(reason) => {
                Value::record("Failed", vec![("reason", reason.describe())])
            }
        }
    }
}

impl Reconstruct for CounterMsg {
    fn reconstruct(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Ref { type_name, .. } => match type_name.as_str() {
                "Increment" => Ok(CounterMsg::Increment),
                "Decrement" => Ok(CounterMsg::Decrement),
                "Add" => Ok(CounterMsg::Add(field(value, "amount")?)),
                "SpawnAdd" => Ok(CounterMsg::SpawnAdd(field(value, "amount")?)),
                "Failed" => Ok(CounterMsg::Failed(field(value, "reason")?)),
                _ => Err(DecodeError::UnknownType(type_name.clone())),
            },
            other => Err(DecodeError::TypeMismatch {
                expected: "Ref",
                found: other.shape(),
            }),
        }
    }
}
