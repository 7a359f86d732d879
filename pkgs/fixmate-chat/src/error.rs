//! Error types for chat operations

use thiserror::Error;

/// Errors that can occur while driving the chat state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Rejected on the client before any network call was made
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The session token was rejected; the session must be torn down
    #[error("Unauthorized: session expired or revoked")]
    Unauthorized,
    #[error("Server rejected request ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Real-time connection is not available")]
    Disconnected,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    /// Only an authorization failure ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::Unauthorized)
    }

    /// Whether the user can retry the same action with local state preserved.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChatError::Unauthorized | ChatError::Validation(_))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
