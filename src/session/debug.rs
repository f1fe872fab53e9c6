//! Per-component debug sessions.
//!
//! A [`DebugContext`] is constructed once per process with the debug
//! configuration and owns the shared transport; components attach to it to
//! get a [`DebugSession`]. The session's driver task observes the
//! component's transitions, encodes them off the update loop, and queues
//! them for sending; inbound `ApplyMessage`/`ApplyState` frames are decoded
//! strictly and injected into the runtime, answered with `ActionApplied`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::component::{Component, Transition};
use crate::config::DebugConfig;
use crate::protocol::{ClientMessage, ComponentId, ServerMessage};
use crate::transport::{ConnectionStatus, Multiplexer, TransportError};
use crate::value::{Describe, Reconstruct};

use super::queue::SnapshotQueue;
use super::state::SessionState;

/// Explicit debug context: one per process, passed by reference wherever a
/// session is created. Owns the transport's lifecycle.
pub struct DebugContext {
    config: DebugConfig,
    multiplexer: Multiplexer,
}

impl DebugContext {
    pub fn new(config: DebugConfig) -> Self {
        let multiplexer = Multiplexer::spawn(&config);
        Self {
            config,
            multiplexer,
        }
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    /// Attach a component and start streaming its transitions.
    ///
    /// With the debug endpoint disabled the session stays `Disconnected`
    /// and every send is a no-op; the component behaves identically either
    /// way.
    pub fn attach<S, M>(
        &self,
        component: &Component<S, M>,
        component_id: ComponentId,
    ) -> Result<DebugSession, TransportError>
    where
        S: Describe + Reconstruct + Send + Sync + 'static,
        M: Describe + Reconstruct + Send + Sync + 'static,
    {
        let channels = self.multiplexer.attach(component_id)?;
        let initial = SessionState::from_status(*channels.status.borrow());
        let (state_tx, state_rx) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let queue = Arc::new(SnapshotQueue::new(self.config.snapshot_queue_capacity));

        tokio::spawn(pump(
            Arc::clone(&queue),
            channels.outbound.clone(),
            cancel.clone(),
        ));

        let driver = Driver {
            component: component.clone(),
            component_id,
            status: channels.status,
            inbound: channels.inbound,
            outbound: channels.outbound,
            queue,
            state_tx,
            cancel: cancel.clone(),
            multiplexer: self.multiplexer.clone(),
        };
        tokio::spawn(driver.run());

        Ok(DebugSession {
            component_id,
            state_rx,
            cancel,
        })
    }

    /// Shut down the transport and every attached session.
    pub fn close(&self) {
        self.multiplexer.close();
    }
}

/// Handle to one component's session.
pub struct DebugSession {
    component_id: ComponentId,
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl DebugSession {
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Close this session only; queued sends are discarded, in-flight
    /// resolver work is left running.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Moves frames from the bounded snapshot queue to the shared transport
/// sink, one at a time.
async fn pump(
    queue: Arc<SnapshotQueue<ServerMessage>>,
    outbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = queue.pop() => {
                if outbound.send(frame).await.is_err() {
                    break;
                }
            }
        }
    }
}

struct Driver<S, M> {
    component: Component<S, M>,
    component_id: ComponentId,
    status: watch::Receiver<ConnectionStatus>,
    inbound: mpsc::Receiver<ClientMessage>,
    outbound: mpsc::Sender<ServerMessage>,
    queue: Arc<SnapshotQueue<ServerMessage>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    multiplexer: Multiplexer,
}

impl<S, M> Driver<S, M>
where
    S: Describe + Reconstruct + Send + Sync + 'static,
    M: Describe + Reconstruct + Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut transitions = self.component.transitions();

        // The transport may already be up when the session attaches.
        let status = *self.status.borrow_and_update();
        self.apply_status(status);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                changed = self.status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *self.status.borrow_and_update();
                    self.apply_status(status);
                    if status == ConnectionStatus::Closed {
                        break;
                    }
                }

                transition = transitions.recv() => match transition {
                    Ok(transition) => self.publish_snapshot(&transition),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "session lagged behind the runtime, snapshots skipped");
                    }
                    // Component gone; nothing left to observe.
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                frame = self.inbound.recv() => match frame {
                    Some(frame) => self.apply_client_message(frame).await,
                    None => break,
                },
            }
        }

        self.queue.clear();
        self.multiplexer.detach(self.component_id);
        self.state_tx.send_replace(SessionState::Closed);
    }

    fn apply_status(&self, status: ConnectionStatus) {
        let next = SessionState::from_status(status);
        let previous = self.state_tx.send_replace(next);

        if next == previous {
            return;
        }
        tracing::debug!(component_id = %self.component_id, ?previous, ?next, "session state");

        match next {
            SessionState::Attached => {
                // Handshake done: announce this component with its current
                // state. The queue was drained on disconnect, so the attach
                // frame precedes any snapshot.
                self.queue.push(ServerMessage::NotifyComponentAttached {
                    component_id: self.component_id,
                    state: self.component.current_state().describe(),
                });
            }
            SessionState::Disconnected => self.queue.clear(),
            SessionState::Connecting | SessionState::Closed => {}
        }
    }

    /// Encode and enqueue one snapshot; runs on the session task, never on
    /// the component's update loop.
    fn publish_snapshot(&self, transition: &Transition<S, M>) {
        if *self.state_tx.borrow() != SessionState::Attached {
            return;
        }
        self.queue.push(ServerMessage::NotifyComponentSnapshot {
            component_id: self.component_id,
            message: transition.message.describe(),
            old_state: transition.old_state.describe(),
            new_state: transition.new_state.describe(),
        });
    }

    /// Strict-mode decode and inject. A decode failure leaves the runtime
    /// untouched and sends no acknowledgement.
    async fn apply_client_message(&self, frame: ClientMessage) {
        let applied = match &frame {
            ClientMessage::ApplyMessage { message, .. } => match M::reconstruct(message) {
                Ok(message) => {
                    self.component.send(message);
                    true
                }
                Err(error) => {
                    tracing::warn!(component_id = %self.component_id, %error, "apply-message rejected");
                    false
                }
            },
            ClientMessage::ApplyState { state, .. } => match S::reconstruct(state) {
                Ok(state) => {
                    self.component.set_state(state);
                    true
                }
                Err(error) => {
                    tracing::warn!(component_id = %self.component_id, %error, "apply-state rejected");
                    false
                }
            },
        };

        if applied {
            let ack = ServerMessage::ActionApplied {
                component_id: self.component_id,
            };
            if self.outbound.send(ack).await.is_err() {
                tracing::warn!("acknowledgement dropped, transport gone");
            }
        }
    }
}
