pub mod conn;
pub mod events;
pub mod hub;
pub mod msg;
mod history;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use conn::Connection;
pub use hub::Hub;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
        .route("/rooms/{room_id}/messages", get(history::history))
}
