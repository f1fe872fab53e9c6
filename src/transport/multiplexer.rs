//! Frame routing for many components over one connection.
//!
//! The multiplexer owns the debug transport exclusively. Sessions interact
//! with it only through [`Multiplexer::attach`]/[`Multiplexer::detach`]:
//! attach hands out a shared outbound sink, a private inbound receiver, and
//! a connectivity watch; the supervisor task routes inbound frames by
//! component id and writes outbound frames one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::DebugConfig;
use crate::protocol::{ClientMessage, ComponentId, ServerMessage};

use super::connection::{supervise, ConnectionStatus, TransportError};

pub(crate) type Registry = Arc<RwLock<HashMap<ComponentId, mpsc::Sender<ClientMessage>>>>;

/// Channel ends a session receives when it attaches.
pub struct SessionChannels {
    /// Shared sink for outbound frames; the writer task serializes them.
    pub outbound: mpsc::Sender<ServerMessage>,
    /// Frames targeting this component only.
    pub inbound: mpsc::Receiver<ClientMessage>,
    /// Connectivity of the shared transport.
    pub status: watch::Receiver<ConnectionStatus>,
}

#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    outbound_tx: mpsc::Sender<ServerMessage>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl Multiplexer {
    /// Start the transport supervisor for the configured endpoint.
    ///
    /// With the endpoint disabled no connection is ever dialed; the status
    /// stays `Disconnected` and attached sessions remain silent.
    pub fn spawn(config: &DebugConfig) -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let cancel = CancellationToken::new();

        if config.enabled {
            tokio::spawn(supervise(
                config.clone(),
                Arc::clone(&registry),
                outbound_rx,
                status_tx,
                cancel.clone(),
            ));
        } else {
            // Hold the receiver so outbound sends stay valid no-ops, and
            // report Closed once shutdown is requested.
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut outbound_rx = outbound_rx;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        frame = outbound_rx.recv() => if frame.is_none() { break },
                    }
                }
                status_tx.send_replace(ConnectionStatus::Closed);
            });
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                outbound_tx,
                status_rx,
                cancel,
            }),
        }
    }

    /// Register a component and hand out its session channels.
    pub fn attach(&self, component_id: ComponentId) -> Result<SessionChannels, TransportError> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let mut registry = self.inner.registry.write();
        if registry.contains_key(&component_id) {
            return Err(TransportError::AlreadyAttached(component_id));
        }
        registry.insert(component_id, inbound_tx);

        Ok(SessionChannels {
            outbound: self.inner.outbound_tx.clone(),
            inbound: inbound_rx,
            status: self.inner.status_rx.clone(),
        })
    }

    /// Remove a component; its inbound frames are dropped from then on.
    pub fn detach(&self, component_id: ComponentId) {
        if self.inner.registry.write().remove(&component_id).is_some() {
            tracing::debug!(%component_id, "session detached");
        }
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_rx.clone()
    }

    /// Shut the transport down; no further attaches or sends.
    pub fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.registry.write().clear();
    }
}
