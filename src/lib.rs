pub mod error;
pub mod events;
pub mod fanout;
pub mod gateway;
pub mod presence;
pub mod rooms;
pub mod store;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}};

use crate::gateway::Gateway;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub gateway: Gateway,
}

pub type AppResult<T> = Result<T, AppError>;
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
