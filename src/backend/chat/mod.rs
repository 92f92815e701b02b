//! Chat Module
//!
//! - **`service`** - `ChatService`: the send path (validate, save, enqueue)
//!   and the history/conversation read models
//! - **`handlers`** - axum handlers for the chat routes

/// Delivery API and read models
pub mod service;

/// HTTP and websocket handlers
pub mod handlers;

pub use service::{ChatHistory, ChatService, ConversationList, ConversationSummary, HistoryEntry};
