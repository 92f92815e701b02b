//! PostgreSQL storage
//!
//! Database operations for users and messages. The schema lives in
//! `migrations/` and is applied at startup by `server::config::load_database`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{stamped, MessageStore, StoreError, UserDirectory, UserInfo};
use crate::shared::{ChatMessage, MessageId, UserId};

/// Store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One row of `user_messages`
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    message_id: MessageId,
    message_by: UserId,
    message_to: UserId,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: Some(row.message_id),
            sender: row.message_by,
            recipient: row.message_to,
            content: row.content,
            created_at: Some(row.created_at),
            session_flag: false,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SavedRow {
    message_id: MessageId,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    name: String,
    icon: Option<Vec<u8>>,
}

impl From<UserRow> for UserInfo {
    fn from(row: UserRow) -> Self {
        UserInfo {
            id: row.id,
            username: row.username,
            name: row.name,
            icon: row.icon,
        }
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn save(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError> {
        let row = sqlx::query_as::<_, SavedRow>(
            r#"
            INSERT INTO user_messages (content, message_by, message_to, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING message_id, created_at
            "#,
        )
        .bind(&message.content)
        .bind(message.sender)
        .bind(message.recipient)
        .fetch_one(&self.pool)
        .await?;

        Ok(stamped(message, row.message_id, row.created_at))
    }

    async fn history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT message_id, message_by, message_to, content, created_at
            FROM user_messages
            WHERE (message_by = $1 AND message_to = $2)
               OR (message_by = $2 AND message_to = $1)
            ORDER BY created_at ASC, message_id ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn latest_per_conversation(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT message_id, message_by, message_to, content, created_at
            FROM (
                SELECT DISTINCT ON (LEAST(message_by, message_to), GREATEST(message_by, message_to))
                    message_id, message_by, message_to, content, created_at
                FROM user_messages
                WHERE message_by = $1 OR message_to = $1
                ORDER BY LEAST(message_by, message_to),
                         GREATEST(message_by, message_to),
                         created_at DESC,
                         message_id DESC
            ) latest
            ORDER BY created_at DESC, message_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn resolve_id(&self, username: &str) -> Result<UserId, StoreError> {
        let id = sqlx::query_scalar::<_, UserId>("SELECT id FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        id.ok_or_else(|| StoreError::user_not_found(username))
    }

    async fn display_info(&self, user_id: UserId) -> Result<UserInfo, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, name, icon FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserInfo::from)
            .ok_or_else(|| StoreError::user_not_found(user_id))
    }
}
