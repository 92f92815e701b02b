//! Authentication Module
//!
//! Caller identity for HTTP and websocket routes. Account management lives
//! outside this service; all the backend needs is to verify a signed token
//! and read the user id from it.
//!
//! - **`sessions`** - JWT creation and verification

/// JWT token generation and validation
pub mod sessions;

pub use sessions::{create_token, user_id_from_token, verify_token, Claims, JwtSecret};
