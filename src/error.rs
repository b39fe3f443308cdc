use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

/// Errors raised by the messaging core. Validation and persistence failures
/// only ever reach the connection that caused them; delivery failures are
/// logged and swallowed inside the fanout.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("persistence: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("delivery: {0}")]
    Delivery(String),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    /// Stable code for the outbound `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::Persistence(_) => "persistence",
            ChatError::Delivery(_) => "delivery",
        }
    }
}
