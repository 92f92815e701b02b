//! Shared Error Types
//!
//! Errors that can be produced while decoding or validating chat traffic,
//! independent of where the traffic came from (websocket frame or HTTP form).
//!
//! # Error Categories
//!
//! - `ValidationError` - a well-formed message that breaks a content rule
//! - `FrameError` - a frame that could not be decoded into a message at all
//!
//! # Usage
//!
//! ```rust
//! use pigeon::shared::error::ValidationError;
//!
//! let error = ValidationError::new("content", "Message content cannot be empty");
//! assert_eq!(error.field, "content");
//! ```
use thiserror::Error;

/// A message failed a content rule and was rejected before any side effect
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Validation error in field '{field}': {message}")]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An inbound frame could not be decoded into a `ChatMessage`
///
/// Decode failures are treated as unrecoverable framing faults: the session
/// that produced the frame is torn down.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload was not valid message JSON
    #[error("Malformed message frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A binary payload that is not UTF-8
    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,
}
