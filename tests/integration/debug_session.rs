//! End-to-end session tests: a real component attached through a real
//! WebSocket to the diagnostic debug server.

use std::time::Duration;

use rewind::component::Component;
use rewind::config::{DebugConfig, ReconnectPolicy};
use rewind::protocol::{ClientMessage, ComponentId, ServerMessage};
use rewind::server::{DebugServer, ServerConfig};
use rewind::session::{DebugContext, DebugSession, SessionState};
use rewind::value::{Describe, Value};
use tokio::sync::broadcast;

use super::common::counter::{spawn_counter, CounterMsg, CounterState};
use super::common::{next_frame, wait_for_session_state, TEST_TIMEOUT};

struct Harness {
    server: DebugServer,
    context: DebugContext,
    component: Component<CounterState, CounterMsg>,
    component_id: ComponentId,
    session: DebugSession,
    frames: broadcast::Receiver<ServerMessage>,
}

fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 50,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
    }
}

async fn attach() -> Harness {
    let server = DebugServer::bind(ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        pretty_print: false,
    })
    .await
    .expect("bind debug server");
    let frames = server.frames();

    let context = DebugContext::new(
        DebugConfig::enabled()
            .with_endpoint("127.0.0.1", server.local_addr().port())
            .with_handshake_timeout(Duration::from_secs(1))
            .with_reconnect(fast_reconnect()),
    );

    let component = spawn_counter();
    let component_id = ComponentId::new();
    let session = context
        .attach(&component, component_id)
        .expect("attach session");
    wait_for_session_state(&session, SessionState::Attached).await;

    Harness {
        server,
        context,
        component,
        component_id,
        session,
        frames,
    }
}

fn state_value(count: i32) -> Value {
    CounterState { count }.describe()
}

async fn wait_for_count(
    states: &mut broadcast::Receiver<std::sync::Arc<CounterState>>,
    expected: i32,
) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let state = states.recv().await.expect("component gone");
            if state.count == expected {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("component never reached count {}", expected));
}

#[tokio::test]
async fn attach_announces_the_current_state() {
    let mut harness = attach().await;

    match next_frame(&mut harness.frames).await {
        ServerMessage::NotifyComponentAttached {
            component_id,
            state,
        } => {
            assert_eq!(component_id, harness.component_id);
            assert_eq!(state, state_value(0));
        }
        other => panic!("expected attach frame, got {:?}", other),
    }
}

#[tokio::test]
async fn increment_produces_the_expected_snapshot() {
    let mut harness = attach().await;
    next_frame(&mut harness.frames).await; // attach frame

    harness.component.send(CounterMsg::Increment);

    match next_frame(&mut harness.frames).await {
        ServerMessage::NotifyComponentSnapshot {
            component_id,
            message,
            old_state,
            new_state,
        } => {
            assert_eq!(component_id, harness.component_id);
            assert_eq!(
                message,
                Value::record("Increment", Vec::<(&str, Value)>::new())
            );
            assert_eq!(old_state, state_value(0));
            assert_eq!(new_state, state_value(1));
            // The exact encoded shape from the protocol contract.
            assert_eq!(
                new_state,
                Value::record("State", vec![("count", 1i32.describe())])
            );
        }
        other => panic!("expected snapshot frame, got {:?}", other),
    }
}

#[tokio::test]
async fn apply_state_rewinds_the_component() {
    let mut harness = attach().await;
    next_frame(&mut harness.frames).await; // attach frame
    let mut states = harness.component.states();

    let delivered = harness
        .server
        .push(ClientMessage::ApplyState {
            component_id: harness.component_id,
            state: state_value(42),
        })
        .await;
    assert!(delivered);

    // The rewind is acknowledged and observable, but emits no snapshot.
    match next_frame(&mut harness.frames).await {
        ServerMessage::ActionApplied { component_id } => {
            assert_eq!(component_id, harness.component_id);
        }
        other => panic!("expected acknowledgement, got {:?}", other),
    }
    wait_for_count(&mut states, 42).await;

    // The next genuine transition starts from the injected state.
    harness.component.send(CounterMsg::Increment);
    match next_frame(&mut harness.frames).await {
        ServerMessage::NotifyComponentSnapshot {
            old_state,
            new_state,
            ..
        } => {
            assert_eq!(old_state, state_value(42));
            assert_eq!(new_state, state_value(43));
        }
        other => panic!("expected snapshot frame, got {:?}", other),
    }
}

#[tokio::test]
async fn apply_message_flows_through_update() {
    let mut harness = attach().await;
    next_frame(&mut harness.frames).await; // attach frame

    let delivered = harness
        .server
        .push(ClientMessage::ApplyMessage {
            component_id: harness.component_id,
            message: CounterMsg::Increment.describe(),
        })
        .await;
    assert!(delivered);

    assert!(matches!(
        next_frame(&mut harness.frames).await,
        ServerMessage::ActionApplied { .. }
    ));
    match next_frame(&mut harness.frames).await {
        ServerMessage::NotifyComponentSnapshot {
            old_state,
            new_state,
            ..
        } => {
            assert_eq!(old_state, state_value(0));
            assert_eq!(new_state, state_value(1));
        }
        other => panic!("expected snapshot frame, got {:?}", other),
    }
}

#[tokio::test]
async fn unresolvable_state_type_is_rejected_without_side_effects() {
    let mut harness = attach().await;
    next_frame(&mut harness.frames).await; // attach frame
    let mut states = harness.component.states();

    let delivered = harness
        .server
        .push(ClientMessage::ApplyState {
            component_id: harness.component_id,
            state: Value::record("Mystery", vec![("count", 1i32.describe())]),
        })
        .await;
    assert!(delivered);

    // No acknowledgement: the request was rejected.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), harness.frames.recv())
            .await
            .is_err()
    );
    assert_eq!(harness.component.current_state().count, 0);

    // The session is still live: a well-formed rewind goes through.
    harness
        .server
        .push(ClientMessage::ApplyState {
            component_id: harness.component_id,
            state: state_value(7),
        })
        .await;
    assert!(matches!(
        next_frame(&mut harness.frames).await,
        ServerMessage::ActionApplied { .. }
    ));
    wait_for_count(&mut states, 7).await;
}

#[tokio::test]
async fn transport_loss_degrades_without_touching_the_runtime() {
    let mut harness = attach().await;
    next_frame(&mut harness.frames).await; // attach frame
    let port = harness.server.local_addr().port();

    harness.server.close();
    wait_for_session_state(&harness.session, SessionState::Disconnected).await;

    // The component keeps processing with no debugger attached.
    let mut states = harness.component.states();
    harness.component.send(CounterMsg::Increment);
    wait_for_count(&mut states, 1).await;

    // A new server on the same endpoint picks the session back up.
    let replacement = tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match DebugServer::bind(ServerConfig {
                host: "127.0.0.1".to_string(),
                port,
                pretty_print: false,
            })
            .await
            {
                Ok(server) => return server,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("rebind debug server");

    wait_for_session_state(&harness.session, SessionState::Attached).await;

    // The re-attach announces the state the component reached meanwhile.
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            if let Some(record) = replacement.component(harness.component_id) {
                assert_eq!(record.last_state, state_value(1));
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("replacement server never saw the component");
}

#[tokio::test]
async fn closing_the_session_is_terminal_and_leaves_the_runtime_alone() {
    let harness = attach().await;

    harness.session.close();
    wait_for_session_state(&harness.session, SessionState::Closed).await;
    assert!(harness.session.state().is_terminal());

    let mut states = harness.component.states();
    harness.component.send(CounterMsg::Increment);
    wait_for_count(&mut states, 1).await;

    harness.context.close();
}
