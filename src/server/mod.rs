//! Headless diagnostic debug server.
//!
//! The viewer counterpart of the session layer, minus any rendering: it
//! accepts runtime connections, keeps per-component last-known state and
//! snapshot counts, logs what it sees, and lets a caller (a test, or a
//! human poking at a live app) push `ApplyMessage`/`ApplyState` frames back
//! down the right connection. Values arriving with type names this build
//! does not know are kept and displayed as-is; the server never
//! reconstructs anything.

mod handler;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::protocol::{ClientMessage, ComponentId, ServerMessage};
use crate::value::Value;

use handler::handle_socket;

/// Diagnostic server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on; 0 picks a free port.
    pub port: u16,
    /// Pretty-print received frames in the log.
    pub pretty_print: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            pretty_print: false,
        }
    }
}

/// What the server currently knows about one component.
#[derive(Debug, Clone)]
pub struct ComponentRecord {
    pub last_state: Value,
    pub snapshots: u64,
}

struct Inner {
    pretty_print: bool,
    /// Everything received, fanned out to programmatic subscribers.
    frames_tx: broadcast::Sender<ServerMessage>,
    components: RwLock<HashMap<ComponentId, ComponentRecord>>,
    /// Which connection hosts which component, learned from its frames.
    routes: RwLock<HashMap<ComponentId, usize>>,
    clients: RwLock<HashMap<usize, mpsc::Sender<ClientMessage>>>,
    next_client: AtomicUsize,
    /// Fired on shutdown; severs live connections, not just the listener.
    shutdown: CancellationToken,
}

/// Shared state behind the router.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

impl ServerState {
    fn new(pretty_print: bool) -> Self {
        let (frames_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                pretty_print,
                frames_tx,
                components: RwLock::new(HashMap::new()),
                routes: RwLock::new(HashMap::new()),
                clients: RwLock::new(HashMap::new()),
                next_client: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn shutdown_requested(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    fn register_client(&self) -> (usize, mpsc::Receiver<ClientMessage>) {
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(16);
        self.inner.clients.write().insert(id, tx);
        (id, rx)
    }

    fn unregister_client(&self, client_id: usize) {
        self.inner.clients.write().remove(&client_id);
        self.inner
            .routes
            .write()
            .retain(|_, hosted_by| *hosted_by != client_id);
    }

    fn record_frame(&self, client_id: usize, frame: ServerMessage) {
        let component_id = frame.component_id();
        self.inner.routes.write().insert(component_id, client_id);

        match &frame {
            ServerMessage::NotifyComponentAttached { state, .. } => {
                tracing::info!(%component_id, state = %self.render(state), "component attached");
                self.inner.components.write().insert(
                    component_id,
                    ComponentRecord {
                        last_state: state.clone(),
                        snapshots: 0,
                    },
                );
            }
            ServerMessage::NotifyComponentSnapshot {
                message, new_state, ..
            } => {
                tracing::info!(
                    %component_id,
                    message = %self.render(message),
                    new_state = %self.render(new_state),
                    "snapshot"
                );
                let mut components = self.inner.components.write();
                let record = components.entry(component_id).or_insert(ComponentRecord {
                    last_state: new_state.clone(),
                    snapshots: 0,
                });
                record.last_state = new_state.clone();
                record.snapshots += 1;
            }
            ServerMessage::ActionApplied { .. } => {
                tracing::info!(%component_id, "action applied");
            }
        }

        let _ = self.inner.frames_tx.send(frame);
    }

    fn render(&self, value: &Value) -> String {
        let wire = value.to_wire();
        if self.inner.pretty_print {
            serde_json::to_string_pretty(&wire).unwrap_or_else(|_| wire.to_string())
        } else {
            wire.to_string()
        }
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A running diagnostic server.
pub struct DebugServer {
    state: ServerState,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl DebugServer {
    /// Bind and start serving.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let state = ServerState::new(config.pretty_print);
        let listener =
            tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = state.shutdown_requested();

        let app = build_router(state.clone());
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned());
            if let Err(error) = serve.await {
                tracing::error!(%error, "debug server stopped");
            }
        });

        tracing::info!(%local_addr, "debug server listening");
        Ok(Self {
            state,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to every frame the server receives.
    pub fn frames(&self) -> broadcast::Receiver<ServerMessage> {
        self.state.inner.frames_tx.subscribe()
    }

    /// Last-known record for a component, if it ever announced itself.
    pub fn component(&self, component_id: ComponentId) -> Option<ComponentRecord> {
        self.state.inner.components.read().get(&component_id).cloned()
    }

    /// Push a client frame down the connection hosting its component.
    ///
    /// Returns `false` when the component is unknown or its connection is
    /// gone.
    pub async fn push(&self, message: ClientMessage) -> bool {
        let component_id = message.component_id();
        let target = {
            let routes = self.state.inner.routes.read();
            routes
                .get(&component_id)
                .and_then(|client_id| self.state.inner.clients.read().get(client_id).cloned())
        };

        match target {
            Some(tx) => tx.send(message).await.is_ok(),
            None => {
                tracing::warn!(%component_id, "no connection hosts this component");
                false
            }
        }
    }

    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
