use crate::domain::services::state_machine::TransitionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unexpected response ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Server or local permission rejection caused by assignment
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ChatError::Forbidden(_))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
