//! Runtime-level properties: determinism of the state sequence and
//! debugger-absent safety.

use rewind::config::DebugConfig;
use rewind::protocol::ComponentId;
use rewind::session::DebugContext;

use super::common::counter::{spawn_counter, CounterMsg};

/// Feed a fixed message sequence (no commands involved) and record every
/// state the component publishes.
async fn run_sequence(messages: &[CounterMsg]) -> Vec<i32> {
    let component = spawn_counter();
    let mut states = component.states();

    for message in messages {
        component.send(message.clone());
    }

    let mut observed = Vec::with_capacity(messages.len());
    for _ in 0..messages.len() {
        observed.push(states.recv().await.unwrap().count);
    }
    observed
}

#[tokio::test]
async fn state_sequence_is_deterministic() {
    let sequence = vec![
        CounterMsg::Increment,
        CounterMsg::Increment,
        CounterMsg::Decrement,
        CounterMsg::Add(10),
        CounterMsg::Increment,
    ];

    let first = run_sequence(&sequence).await;
    let second = run_sequence(&sequence).await;
    let third = run_sequence(&sequence).await;

    assert_eq!(first, vec![1, 2, 1, 11, 12]);
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[tokio::test]
async fn disabled_debug_endpoint_changes_nothing() {
    let sequence = vec![
        CounterMsg::Increment,
        CounterMsg::Add(5),
        CounterMsg::Decrement,
    ];

    // Bare component, no debug layer at all.
    let bare = run_sequence(&sequence).await;

    // Same component attached to a disabled context: nothing is dialed,
    // behavior is identical.
    let context = DebugContext::new(DebugConfig::default());
    let component = spawn_counter();
    let session = context
        .attach(&component, ComponentId::new())
        .expect("attach never fails on a disabled context");
    let mut states = component.states();

    for message in &sequence {
        component.send(message.clone());
    }
    let mut observed = Vec::new();
    for _ in 0..sequence.len() {
        observed.push(states.recv().await.unwrap().count);
    }

    assert_eq!(observed, bare);
    session.close();
}

#[tokio::test]
async fn resolver_results_reenter_the_queue() {
    let component = spawn_counter();
    let mut states = component.states();

    component.send(CounterMsg::SpawnAdd(3));

    // First the no-op transition from SpawnAdd itself, then the resolver's
    // Add once its task completes.
    assert_eq!(states.recv().await.unwrap().count, 0);
    assert_eq!(states.recv().await.unwrap().count, 3);
}
