//! Storage Module
//!
//! The persistence boundary of the chat backend. The delivery core only talks
//! to storage through two narrow traits:
//!
//! - **`MessageStore`** - save a message, read a conversation's history, read
//!   the latest message of every conversation a user takes part in
//! - **`UserDirectory`** - resolve usernames and fetch display information
//!
//! # Implementations
//!
//! - **`memory`** - `InMemoryStore`, used when no database is configured and
//!   throughout the test suite
//! - **`postgres`** - `PgStore`, backed by a `sqlx::PgPool`
//!
//! # Module Structure
//!
//! ```text
//! storage/
//! ├── mod.rs       - Traits, UserInfo, StoreError
//! ├── memory.rs    - In-memory implementation
//! └── postgres.rs  - PostgreSQL implementation
//! ```

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

use crate::shared::{ChatMessage, MessageId, UserId};

/// In-memory store
pub mod memory;

/// PostgreSQL store
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Errors returned by storage implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of thing that was looked up ("user", ...)
        entity: &'static str,
        /// The key that was looked up
        key: String,
    },

    /// The database rejected or failed the query
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store cannot serve requests at the moment
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn user_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "user",
            key: key.to_string(),
        }
    }
}

/// Display information about a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub icon: Option<Vec<u8>>,
}

impl UserInfo {
    /// Icon bytes as standard base64, empty when the user has no icon
    pub fn icon_base64(&self) -> String {
        self.icon
            .as_deref()
            .map(|icon| base64::engine::general_purpose::STANDARD.encode(icon))
            .unwrap_or_default()
    }

    /// Public view used in HTTP responses
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            name: self.name.clone(),
            username: self.username.clone(),
            icon_base64: self.icon_base64(),
        }
    }
}

/// Serialized form of `UserInfo`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub username: String,
    pub icon_base64: String,
}

/// Durable message storage
///
/// `save` is called exactly once per accepted message; callers never retry
/// it, so implementations do not have to de-duplicate.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its id and creation time
    ///
    /// Returns the saved message with `id` and `created_at` filled in.
    async fn save(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError>;

    /// All messages exchanged between two users, oldest first
    async fn history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<ChatMessage>, StoreError>;

    /// The most recent message of every conversation `user_id` is part of,
    /// most recent conversation first
    async fn latest_per_conversation(&self, user_id: UserId)
        -> Result<Vec<ChatMessage>, StoreError>;
}

/// User lookup
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a username to its id, `StoreError::NotFound` if unknown
    async fn resolve_id(&self, username: &str) -> Result<UserId, StoreError>;

    /// Display information for a user id
    async fn display_info(&self, user_id: UserId) -> Result<UserInfo, StoreError>;
}

/// Stamp a message with the id and timestamp a store assigned
pub(crate) fn stamped(
    message: &ChatMessage,
    id: MessageId,
    created_at: chrono::DateTime<chrono::Utc>,
) -> ChatMessage {
    ChatMessage {
        id: Some(id),
        created_at: Some(created_at),
        session_flag: false,
        ..message.clone()
    }
}
