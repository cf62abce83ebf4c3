//! WebSocket handler for live conflict events.
//!
//! Every connection receives the engine's event stream and may ask for the
//! current conflict list.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{ClientMessage, ServerMessage};
use crate::AppState;

/// Upgrade an HTTP request to a WebSocket connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state))
}

/// Handle an established WebSocket connection.
///
/// Outgoing messages go through the connection manager's channel so engine
/// events and direct responses share one ordered stream.
async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_manager = state.conn_manager.clone();
    let conn_id = conn_manager.register(tx);

    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &state);
                conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message and return a server response.
fn process_message(text: &str, state: &AppState) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    match client_msg {
        ClientMessage::ListConflicts { request_id } => ServerMessage::Conflicts {
            conflicts: state.engine.active_conflicts(),
            request_id,
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_process_message() {
        let state = AppState::new(Config::default());

        assert!(matches!(
            process_message(r#"{"type":"ping"}"#, &state),
            ServerMessage::Pong
        ));

        match process_message(r#"{"type":"list_conflicts","request_id":"r1"}"#, &state) {
            ServerMessage::Conflicts {
                conflicts,
                request_id,
            } => {
                assert!(conflicts.is_empty());
                assert_eq!(request_id.as_deref(), Some("r1"));
            }
            other => panic!("Expected Conflicts, got {:?}", other),
        }

        assert!(matches!(
            process_message("not json", &state),
            ServerMessage::Error { request_id: None, .. }
        ));
    }
}
