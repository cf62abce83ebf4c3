//! WebSocket push channel for conflict events.
//!
//! Clients connect to `/ws` and receive every [`ConflictEvent`] the engine
//! publishes, wrapped in [`ServerMessage::Event`].

mod handler;
mod manager;
mod protocol;

pub use handler::ws_handler;
pub use manager::ConnectionManager;
pub use protocol::*;

use std::sync::Arc;
use stockpile_engine::ConflictEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Forward engine events to every connected client until the engine goes away.
pub fn spawn_event_forwarder(
    mut events: broadcast::Receiver<ConflictEvent>,
    conn_manager: Arc<ConnectionManager>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let sent = conn_manager.broadcast_all(ServerMessage::from(event));
                    tracing::trace!(recipients = sent, "Forwarded conflict event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event forwarder lagged behind the engine");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
