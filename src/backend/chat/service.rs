/**
 * Chat Service
 *
 * The delivery API shared by the websocket session and the HTTP handlers.
 *
 * # Send Path
 *
 * Every accepted message follows the same steps, whichever route it came
 * from:
 *
 * 1. validate and check the recipient exists (no side effects on rejection)
 * 2. save through the `MessageStore` (a failure means "not sent")
 * 3. submit the saved message to the `DeliveryWorkerPool`
 *
 * Step 3 never fails the send. A full queue or a closed pool costs the live
 * push only; the recipient finds the message in the history.
 *
 * # Read Path
 *
 * `history` and `conversations` shape store results for the HTTP layer,
 * adding per-viewer flags and display information.
 */

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::error::BackendError;
use crate::backend::realtime::{DeliveryWorkerPool, Job};
use crate::backend::storage::{MessageStore, StoreError, UserDirectory, UserProfile};
use crate::shared::{ChatMessage, MessageId, UserId, ValidationError};

/// Username wrapper used by response bodies (`{"username": ...}`)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
}

/// One message in a conversation view
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub message: ChatMessage,
    /// Creation time as `HH:MM`
    pub hour_minute: String,
    /// Display information of the author
    pub author: UserProfile,
}

/// A conversation between the viewer and one partner
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub current_username: CurrentUser,
    pub messages: Vec<HistoryEntry>,
    pub user_infos: UserProfile,
}

/// Latest message of one conversation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub partner: UserProfile,
    #[serde(flatten)]
    pub last_message: ChatMessage,
    pub hour_minute: String,
}

/// All conversations of one viewer, most recent first
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationList {
    pub current_username: CurrentUser,
    pub chats: Vec<ConversationSummary>,
}

/// Delivery API over the store, the user directory and the worker pool
pub struct ChatService {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    pool: Arc<DeliveryWorkerPool>,
}

impl ChatService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        pool: Arc<DeliveryWorkerPool>,
    ) -> Self {
        Self {
            messages,
            users,
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<DeliveryWorkerPool> {
        &self.pool
    }

    /// Validate, persist and enqueue a message whose sender is already set
    ///
    /// Returns the saved message.
    pub async fn dispatch(&self, message: ChatMessage) -> Result<ChatMessage, BackendError> {
        message.validate()?;
        // Unknown recipients are rejected before anything is written
        self.users.display_info(message.recipient).await?;
        let saved = self.messages.save(&message).await?;
        debug!(
            message_id = ?saved.id,
            sender = saved.sender,
            recipient = saved.recipient,
            "message saved"
        );

        // Refusals are counted and logged by the pool
        if let Err(e) = self.pool.submit(Job::new(saved.clone())) {
            debug!(message_id = ?saved.id, error = %e, "live delivery skipped");
        }
        Ok(saved)
    }

    /// Send `content` from `sender_id` to the user called `recipient_username`
    pub async fn send_message(
        &self,
        sender_id: UserId,
        recipient_username: &str,
        content: &str,
    ) -> Result<MessageId, BackendError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::new("content", "Values are missing!").into());
        }

        let recipient = self.users.resolve_id(recipient_username.trim()).await?;
        let saved = self
            .dispatch(ChatMessage::new(sender_id, recipient, content))
            .await?;
        let id = saved.id.ok_or_else(|| {
            BackendError::Store(StoreError::Unavailable("store did not assign an id".into()))
        })?;

        info!(message_id = id, sender = sender_id, recipient, "message sent");
        Ok(id)
    }

    /// The conversation between `viewer` and `partner_username`, oldest first
    pub async fn history(
        &self,
        viewer: UserId,
        partner_username: &str,
    ) -> Result<ChatHistory, BackendError> {
        let partner_id = self.users.resolve_id(partner_username).await?;
        let viewer_info = self.users.display_info(viewer).await?;
        let partner_info = self.users.display_info(partner_id).await?;
        let viewer_profile = viewer_info.profile();
        let partner_profile = partner_info.profile();

        let messages = self
            .messages
            .history(viewer, partner_id)
            .await?
            .into_iter()
            .map(|message| {
                let author = if message.is_own(viewer) {
                    viewer_profile.clone()
                } else {
                    partner_profile.clone()
                };
                HistoryEntry {
                    hour_minute: hour_minute(&message),
                    message: message.for_viewer(viewer),
                    author,
                }
            })
            .collect();

        Ok(ChatHistory {
            current_username: CurrentUser {
                username: viewer_info.username,
            },
            messages,
            user_infos: partner_profile,
        })
    }

    /// Latest message per conversation for `viewer`, most recent first
    pub async fn conversations(&self, viewer: UserId) -> Result<ConversationList, BackendError> {
        let viewer_info = self.users.display_info(viewer).await?;
        let latest = self.messages.latest_per_conversation(viewer).await?;

        let mut chats = Vec::with_capacity(latest.len());
        for message in latest {
            let partner_id = if message.is_own(viewer) {
                message.recipient
            } else {
                message.sender
            };
            let partner = self.users.display_info(partner_id).await?.profile();
            chats.push(ConversationSummary {
                partner,
                hour_minute: hour_minute(&message),
                last_message: message.for_viewer(viewer),
            });
        }

        Ok(ConversationList {
            current_username: CurrentUser {
                username: viewer_info.username,
            },
            chats,
        })
    }
}

fn hour_minute(message: &ChatMessage) -> String {
    message
        .created_at
        .map(|at| at.format("%H:%M").to_string())
        .unwrap_or_default()
}
