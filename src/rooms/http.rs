use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::ChatError;
use crate::events::ServerEvent;
use crate::gateway::Gateway;
use crate::store::{Message, MessageDraft, MessageKind, HISTORY_LIMIT};
use crate::AppResult;

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<u32>,
}

/// Read-only projection of the store, same order `list_by_room` gives the
/// room snapshot.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_messages(
    Path(room_id): Path<String>,
    Query(HistoryQuery { limit }): Query<HistoryQuery>,
    State(gateway): State<Gateway>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = gateway
        .store
        .list_by_room(&room_id, limit.unwrap_or(HISTORY_LIMIT))
        .await?;
    Ok(Json(messages))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_users(
    Path(room_id): Path<String>,
    State(gateway): State<Gateway>,
) -> Json<Vec<String>> {
    Json(gateway.presence.list_room(&room_id))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostMessageBody {
    sender_name: String,
    body: String,
    #[serde(default)]
    kind: MessageKind,
}

/// Plain REST send path for clients without a live socket. Persists, then
/// echoes to whoever is subscribed right now.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_message(
    Path(room_id): Path<String>,
    State(gateway): State<Gateway>,
    Json(PostMessageBody {
        sender_name,
        body,
        kind,
    }): Json<PostMessageBody>,
) -> AppResult<Response> {
    let draft = MessageDraft {
        room_id,
        sender_connection_id: None,
        sender_name,
        body,
        kind,
    };

    let message = match gateway.store.append(draft).await {
        Ok(message) => message,
        Err(e @ ChatError::Validation(_)) => {
            return Ok((StatusCode::BAD_REQUEST, e.to_string()).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    gateway.fanout.broadcast_to_room(
        &message.room_id,
        ServerEvent::NewMessage {
            message: message.clone(),
        },
        None,
    );

    Ok((StatusCode::CREATED, Json(message)).into_response())
}
