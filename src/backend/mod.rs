//! Backend Module
//!
//! Server-side code for the pigeon chat backend.
//!
//! # Architecture
//!
//! - **`realtime`** - connection registry, delivery worker pool, batching,
//!   inactivity monitoring and the per-connection session
//! - **`chat`** - send path and read models, HTTP handlers
//! - **`storage`** - `MessageStore` / `UserDirectory` and their implementations
//! - **`server`** - configuration, application state, startup wiring
//! - **`routes`** - router assembly
//! - **`auth`** / **`middleware`** - token verification and caller extraction
//! - **`error`** - `BackendError`
//!
//! ```text
//! backend/
//! ├── mod.rs
//! ├── main.rs       - binary entry point
//! ├── server/
//! ├── routes/
//! ├── chat/
//! ├── realtime/
//! ├── storage/
//! ├── auth/
//! ├── middleware/
//! └── error/
//! ```
//!
//! # Delivery Model
//!
//! A message is saved before it is handed to the delivery workers. Live
//! delivery on top of that is best effort: offline recipients are skipped,
//! a full queue drops the live push, and a failing socket only affects its
//! own connection.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Chat send path and handlers
pub mod chat;

/// Live connections and delivery
pub mod realtime;

/// Message and user storage
pub mod storage;

/// Backend error types
pub mod error;

/// Token verification
pub mod auth;

/// Request extractors
pub mod middleware;

pub use chat::ChatService;
pub use error::BackendError;
pub use realtime::{ConnectionRegistry, DeliveryWorkerPool, RealtimeHub};
pub use server::{create_app, AppState, ServerConfig};
