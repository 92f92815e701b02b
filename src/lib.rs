//! Pigeon - Real-time Chat Backend
//!
//! Clients exchange short text messages over websockets. Messages are
//! persisted first and then pushed live to recipients that are connected;
//! offline recipients pick them up from the history.
//!
//! # Module Structure
//!
//! - **`shared`** - wire types shared with clients (`ChatMessage`, notices,
//!   validation and framing errors)
//! - **`backend`** - the axum server: realtime delivery, storage, HTTP routes
//!
//! # Usage
//!
//! ```rust,no_run
//! use pigeon::backend::server::{create_app, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let (app, state) = create_app(&config).await?;
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
//! axum::serve(listener, app).await?;
//! state.pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
