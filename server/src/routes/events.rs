//! Live event stream.

use axum::{routing::get, Router};

use crate::websocket::ws_handler;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
