//! In-memory storage
//!
//! Keeps users and messages in process memory. State is lost on restart, so
//! this is meant for local development (no `DATABASE_URL`) and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{stamped, MessageStore, StoreError, UserDirectory, UserInfo};
use crate::shared::{ChatMessage, UserId};

#[derive(Default)]
struct Inner {
    users: Vec<UserInfo>,
    messages: Vec<ChatMessage>,
}

/// Store backed by process memory
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, returning the assigned id (ids start at 1)
    pub async fn add_user(
        &self,
        username: impl Into<String>,
        name: impl Into<String>,
        icon: Option<Vec<u8>>,
    ) -> UserId {
        let mut inner = self.inner.write().await;
        let id = inner.users.len() as UserId + 1;
        inner.users.push(UserInfo {
            id,
            username: username.into(),
            name: name.into(),
            icon,
        });
        id
    }

    /// Number of saved messages
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn save(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner.messages.len() as i64 + 1;
        let saved = stamped(message, id, Utc::now());
        inner.messages.push(saved.clone());
        Ok(saved)
    }

    async fn history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        // Insertion order is arrival order
        Ok(inner
            .messages
            .iter()
            .filter(|m| {
                (m.sender == user_a && m.recipient == user_b)
                    || (m.sender == user_b && m.recipient == user_a)
            })
            .cloned()
            .collect())
    }

    async fn latest_per_conversation(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut latest: HashMap<UserId, &ChatMessage> = HashMap::new();
        for message in &inner.messages {
            let partner = if message.sender == user_id {
                message.recipient
            } else if message.recipient == user_id {
                message.sender
            } else {
                continue;
            };
            // Later messages overwrite earlier ones
            latest.insert(partner, message);
        }

        let mut chats: Vec<ChatMessage> = latest.into_values().cloned().collect();
        chats.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(chats)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn resolve_id(&self, username: &str) -> Result<UserId, StoreError> {
        let inner = self.inner.read().await;
        inner
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| StoreError::user_not_found(username))
    }

    async fn display_info(&self, user_id: UserId) -> Result<UserInfo, StoreError> {
        let inner = self.inner.read().await;
        inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::user_not_found(user_id))
    }
}
