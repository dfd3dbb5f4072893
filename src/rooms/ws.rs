use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::{auth::Identity, config::Config, db::MessageStore, AppState};

use super::{events::ClientEvent, Connection, Hub};

/// Socket upgrade. Unauthenticated callers are turned away with `401` before the handshake.
#[debug_handler(state = AppState)]
pub async fn room_ws(
    identity: Identity,
    State(hub): State<Hub>,
    State(store): State<MessageStore>,
    State(config): State<Arc<Config>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let conn = Connection::new(identity, hub.clone(), store, config.max_message_length);
    ws.on_upgrade(async move |stream| serve_socket(stream, conn, hub).await)
}

async fn serve_socket(stream: WebSocket, mut conn: Connection, hub: Hub) {
    let mut rx = hub.register(conn.id()).await;
    let (mut sender, mut receiver) = stream.split();

    tracing::info!(conn_id = %conn.id(), "connected");

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => conn.handle(event).await,
                    Err(e) => tracing::debug!(conn_id = %conn.id(), error = %e, "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward_task => break,
        }
    }

    conn.disconnect().await;
    forward_task.abort();
}
