//! WebSocket transport for real-time task notifications.
//!
//! Each upgraded socket is registered as a channel-backed connection in the
//! [`ConnectionRegistry`](taskcast_events::ConnectionRegistry) under the
//! owner named in the query string.

mod handler;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub use handler::{ws_handler, WsQuery};

/// Mount the WebSocket endpoint (root-level, `/ws`).
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
