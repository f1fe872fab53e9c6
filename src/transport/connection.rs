//! Connection supervision for the debug transport.
//!
//! The supervisor task owns the WebSocket for its whole lifetime: it dials
//! the configured endpoint with a handshake timeout, hands the live stream
//! to the frame loop, and on loss retries with bounded exponential backoff.
//! Once retries are exhausted it stays disconnected for the rest of the
//! instance's lifetime, draining (and dropping) outbound frames so session
//! pumps never stall. The host application is never affected either way.

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng as _;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::{DebugConfig, ReconnectPolicy};
use crate::protocol::{ClientMessage, ServerMessage};

use super::multiplexer::Registry;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures raised by the debug transport. None of them ever propagate to
/// the application's message stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("handshake with {url} timed out after {timeout:?}")]
    HandshakeTimeout { url: String, timeout: Duration },

    #[error("component {0} is already attached")]
    AlreadyAttached(crate::protocol::ComponentId),

    #[error("transport is closed")]
    Closed,
}

/// Connectivity of the shared debug transport, observed by every session
/// through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, or `None` once attempts are
    /// exhausted. Jittered by up to 10% to avoid reconnect stampedes.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        Some(delay.mul_f64(1.0 + rand::rng().random_range(0.0..0.1)))
    }
}

pub(crate) async fn connect(url: &str, timeout: Duration) -> Result<WsStream, TransportError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(source)) => Err(TransportError::Connect {
            url: url.to_string(),
            source,
        }),
        Err(_elapsed) => Err(TransportError::HandshakeTimeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

enum Terminated {
    /// Shutdown requested or every frame producer is gone.
    Cancelled,
    /// The connection itself failed; the supervisor will retry.
    Transport(String),
}

impl fmt::Display for Terminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminated::Cancelled => f.write_str("cancelled"),
            Terminated::Transport(reason) => f.write_str(reason),
        }
    }
}

/// Owns the connection for the lifetime of the multiplexer.
pub(crate) async fn supervise(
    config: DebugConfig,
    registry: Registry,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
) {
    let url = config.url();
    let mut backoff = Backoff::new(config.reconnect.clone());

    'supervise: while !cancel.is_cancelled() {
        status_tx.send_replace(ConnectionStatus::Connecting);

        let dialed = tokio::select! {
            result = connect(&url, config.handshake_timeout) => result,
            _ = cancel.cancelled() => break 'supervise,
        };

        match dialed {
            Ok(stream) => {
                tracing::info!(%url, "debug transport connected");
                backoff.reset();
                status_tx.send_replace(ConnectionStatus::Connected);

                let reason = run_connection(
                    stream,
                    &registry,
                    &mut outbound_rx,
                    &cancel,
                    config.pretty_print,
                )
                .await;
                if matches!(reason, Terminated::Cancelled) {
                    break 'supervise;
                }
                tracing::warn!(%reason, "debug transport lost");
            }
            Err(error) => tracing::warn!(%error, "debug transport connect failed"),
        }

        status_tx.send_replace(ConnectionStatus::Disconnected);

        let Some(delay) = backoff.next_delay() else {
            tracing::warn!(%url, "debug transport retries exhausted, staying disconnected");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'supervise,
                    frame = outbound_rx.recv() => match frame {
                        Some(_) => tracing::trace!("outbound frame dropped, transport disconnected"),
                        None => break 'supervise,
                    },
                }
            }
        };

        // Keep draining outbound frames while waiting so a session pump can
        // never stall on a dead transport.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = cancel.cancelled() => break 'supervise,
                frame = outbound_rx.recv() => match frame {
                    Some(_) => tracing::trace!("outbound frame dropped, transport disconnected"),
                    None => break 'supervise,
                },
            }
        }
    }

    status_tx.send_replace(ConnectionStatus::Closed);
}

async fn run_connection(
    stream: WsStream,
    registry: &Registry,
    outbound_rx: &mut mpsc::Receiver<ServerMessage>,
    cancel: &CancellationToken,
    pretty_print: bool,
) -> Terminated {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Terminated::Cancelled;
            }

            // Frames from all attached sessions funnel through one writer,
            // so partial frames can never interleave.
            frame = outbound_rx.recv() => match frame {
                Some(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(error) => {
                            tracing::error!(%error, "unserializable outbound frame dropped");
                            continue;
                        }
                    };
                    if pretty_print {
                        if let Ok(pretty) = serde_json::to_string_pretty(&message) {
                            tracing::trace!(frame = %pretty, "sending");
                        }
                    }
                    if let Err(error) = sink.send(Message::text(text)).await {
                        return Terminated::Transport(error.to_string());
                    }
                }
                None => return Terminated::Cancelled,
            },

            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => route(registry, &text).await,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Terminated::Transport("closed by peer".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Terminated::Transport(error.to_string()),
            },
        }
    }
}

/// Deliver one inbound frame to the session it targets.
async fn route(registry: &Registry, text: &str) {
    let frame: ClientMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(%error, "undecodable inbound frame dropped");
            return;
        }
    };

    let target = registry.read().get(&frame.component_id()).cloned();
    match target {
        Some(tx) => {
            if tx.send(frame).await.is_err() {
                tracing::warn!("inbound frame for a detached session dropped");
            }
        }
        None => tracing::warn!(
            component_id = %frame.component_id(),
            "inbound frame for unknown component dropped"
        ),
    }
}
