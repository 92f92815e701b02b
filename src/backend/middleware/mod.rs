//! Middleware Module
//!
//! Request processing shared by the routes.
//!
//! - **`auth`** - `CallerId` extractor for authenticated routes

pub mod auth;

pub use auth::CallerId;
