/**
 * Chat HTTP Handlers
 *
 * Thin axum glue over `ChatService` and `RealtimeHub`:
 *
 * - `GET /ws/chat` - upgrade and run a chat session for the caller
 * - `POST /api/chat/{username}` - send a message (form field `content`)
 * - `GET /api/chat/{username}` - conversation history with one partner
 * - `GET /api/messages` - latest message of every conversation
 */

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::service::{ChatHistory, ChatService, ConversationList};
use crate::backend::error::BackendError;
use crate::backend::middleware::CallerId;
use crate::backend::realtime::RealtimeHub;
use crate::shared::MessageId;

/// Form body of `POST /api/chat/{username}`
#[derive(Debug, Deserialize)]
pub struct CreateMessageForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageSent {
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    pub message: &'static str,
}

pub async fn chat_socket(
    CallerId(user_id): CallerId,
    State(hub): State<RealtimeHub>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        let end = hub.serve_websocket(user_id, socket).await;
        debug!(user_id, reason = ?end, "websocket closed");
    })
}

pub async fn create_message(
    CallerId(user_id): CallerId,
    State(chat): State<Arc<ChatService>>,
    Path(username): Path<String>,
    Form(form): Form<CreateMessageForm>,
) -> Result<Json<MessageSent>, BackendError> {
    let message_id = chat.send_message(user_id, &username, &form.content).await?;
    Ok(Json(MessageSent {
        message_id,
        message: "Message sent successfully",
    }))
}

pub async fn chat_history(
    CallerId(user_id): CallerId,
    State(chat): State<Arc<ChatService>>,
    Path(username): Path<String>,
) -> Result<Json<ChatHistory>, BackendError> {
    Ok(Json(chat.history(user_id, &username).await?))
}

pub async fn list_conversations(
    CallerId(user_id): CallerId,
    State(chat): State<Arc<ChatService>>,
) -> Result<Json<ConversationList>, BackendError> {
    Ok(Json(chat.conversations(user_id).await?))
}
