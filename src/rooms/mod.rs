mod http;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use ws::chat_ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{room_id}/messages",
            get(http::list_messages).post(http::post_message),
        )
        .route("/{room_id}/users", get(http::list_users))
}
