//! Route Configuration Module
//!
//! - **`router`** - assembles every route and the tower-http layers
//!
//! # Routes
//!
//! - `GET /ws/chat` - websocket chat session
//! - `POST /api/chat/{username}` - send a message
//! - `GET /api/chat/{username}` - conversation history
//! - `GET /api/messages` - conversation list
//! - `GET /health` - liveness
//!
//! Everything except `/health` requires a caller token.

/// Main router creation
pub mod router;

pub use router::create_router;
