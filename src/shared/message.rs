/**
 * Chat Message Data Structure
 *
 * This module defines the `ChatMessage` struct that travels over the
 * websocket transport and through the delivery pipeline, together with the
 * helpers that turn it into (and parse it from) JSON text frames.
 *
 * # Wire Format
 *
 * A single message frame is a JSON object:
 *
 * ```json
 * {"id":7,"sender":1,"recipient":2,"content":"hi","createdAt":"2026-01-01T10:00:00Z","sessionFlag":false}
 * ```
 *
 * A batched flush is a JSON array of such objects. Server notices (for
 * example a rejected message) are `{"error":"..."}` objects.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::{FrameError, ValidationError};

/// Opaque user identifier
pub type UserId = i64;

/// Identifier assigned to a message by the `MessageStore`
pub type MessageId = i64;

/// A single chat message between two users
///
/// Messages are created when an inbound frame is decoded (or when the HTTP
/// create-message path is used), persisted, and then handed to the delivery
/// pipeline. Nothing in the delivery path keeps them after they have been
/// written or flushed; history lives only in the store.
///
/// # Fields
/// * `id` - Assigned by the store on save
/// * `sender` / `recipient` - User identifiers; never equal in valid traffic
/// * `content` - UTF-8 text; absent decodes as empty (system messages)
/// * `created_at` - Assigned at persistence time
/// * `session_flag` - Per-viewer "is own message" flag, computed at read time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub sender: UserId,
    pub recipient: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_flag: bool,
}

impl ChatMessage {
    /// Create an unsaved message
    ///
    /// # Example
    /// ```rust
    /// use pigeon::shared::ChatMessage;
    ///
    /// let message = ChatMessage::new(1, 2, "hi");
    /// assert!(message.id.is_none());
    /// assert!(message.created_at.is_none());
    /// ```
    pub fn new(sender: UserId, recipient: UserId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender,
            recipient,
            content: content.into(),
            created_at: None,
            session_flag: false,
        }
    }

    /// Decode an inbound text frame
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode an inbound binary frame carrying UTF-8 JSON
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
        Self::decode(text)
    }

    /// Check the content rules for user-authored messages
    ///
    /// Rejections have no side effects; callers must validate before saving.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recipient <= 0 {
            return Err(ValidationError::new("recipient", "Recipient is missing"));
        }
        if self.recipient == self.sender {
            return Err(ValidationError::new(
                "recipient",
                "Cannot send a message to yourself",
            ));
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError::new("content", "Values are missing!"));
        }
        Ok(())
    }

    /// Whether `viewer` authored this message
    pub fn is_own(&self, viewer: UserId) -> bool {
        self.sender == viewer
    }

    /// Set `session_flag` for the given viewer
    pub fn for_viewer(mut self, viewer: UserId) -> Self {
        self.session_flag = self.is_own(viewer);
        self
    }

    /// Encode as a single-message text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Encode a recipient's slice of a batch as one framed payload
pub fn encode_batch(messages: &[ChatMessage]) -> Result<String, serde_json::Error> {
    serde_json::to_string(messages)
}

/// Notice written back to a sender whose message was not accepted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerNotice {
    pub error: String,
}

impl ServerNotice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
