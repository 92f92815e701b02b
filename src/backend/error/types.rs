/**
 * Backend Error Types
 *
 * One error type for everything a handler or the chat service can fail
 * with. Each variant maps to an HTTP status; the live path turns the same
 * errors into `{"error": ...}` notices on the sender's socket.
 *
 * # Error Categories
 *
 * - `Validation` - malformed or empty input, rejected before any side effect
 * - `NotFound` - unknown recipient or user
 * - `Unauthorized` - missing or invalid credentials
 * - `Store` - persistence failure; the message counts as not sent
 * - `Transport` - a socket failure surfaced to a caller
 * - `Serialization` - JSON encoding failure
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::realtime::TransportError;
use crate::backend::storage::StoreError;
use crate::shared::ValidationError;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persistence failed
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// HTTP status code for this error
    ///
    /// - `Validation` - 400
    /// - `Unauthorized` - 401
    /// - `NotFound` - 404
    /// - `Store`, `Transport`, `Serialization` - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Transport(_) | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients
    ///
    /// Internal failures are reported generically; details go to the log.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(err) => err.message.clone(),
            Self::NotFound { entity, .. } => format!("{} not found", capitalize(entity)),
            Self::Unauthorized(message) => message.clone(),
            Self::Store(_) => "Failed to send message".to_string(),
            Self::Transport(_) => "Connection error".to_string(),
            Self::Serialization(_) => "Internal server error".to_string(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
