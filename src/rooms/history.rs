use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::{auth::Identity, db::MessageStore, AppResult, AppState};

use super::{conn::sanitize_room_id, Hub};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<u32>,
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    identity: Identity,
    Path(room_id): Path<String>,
    Query(HistoryQuery { limit, password }): Query<HistoryQuery>,
    State(hub): State<Hub>,
    State(store): State<MessageStore>,
) -> AppResult<Response> {
    let room_id = sanitize_room_id(&room_id);
    if room_id.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Invalid room name").into_response());
    }

    if !hub.check_password(&room_id, password.as_deref().filter(|x| !x.is_empty())).await {
        return Ok((StatusCode::FORBIDDEN, "Incorrect room password").into_response());
    }

    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let messages = store.recent(&room_id, limit).await?;

    tracing::debug!(uid = %identity.uid, room_id = %room_id, count = messages.len(), "served history");

    Ok(Json(messages).into_response())
}
