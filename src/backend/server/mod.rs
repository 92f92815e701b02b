//! Server Module
//!
//! Configuration, application state and startup wiring.
//!
//! - **`config`** - `ServerConfig` from the environment, database loading
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`init`** - builds stores, worker pool, hub and router
//!
//! ```text
//! server/
//! ├── mod.rs
//! ├── config.rs
//! ├── state.rs
//! └── init.rs
//! ```

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::{ConfigError, ServerConfig};
pub use init::{build_state, create_app};
pub use state::AppState;
