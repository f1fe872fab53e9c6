//! WebSocket handling for the diagnostic server.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};

use crate::protocol::ServerMessage;

use super::ServerState;

/// Drive one runtime connection until either side closes it.
pub(crate) async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (client_id, mut commands) = state.register_client();
    tracing::debug!(client_id, "runtime connected");

    let (mut sink, mut stream) = socket.split();
    let shutdown = state.shutdown_requested();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            command = commands.recv() => match command {
                Some(command) => {
                    let text = match serde_json::to_string(&command) {
                        Ok(text) => text,
                        Err(error) => {
                            tracing::error!(%error, "unserializable client frame dropped");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(frame) => state.record_frame(client_id, frame),
                    // Permissive by design: a frame this build cannot parse
                    // is logged raw, not fatal.
                    Err(error) => tracing::warn!(%error, raw = %text, "unparseable frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::debug!(%error, "runtime connection error");
                    break;
                }
            },
        }
    }

    state.unregister_client(client_id);
    tracing::debug!(client_id, "runtime disconnected");
}
