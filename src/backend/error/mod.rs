//! Backend Error Module
//!
//! Error types returned by HTTP handlers and the chat service.
//!
//! - **`types`** - `BackendError` and its status mapping
//! - **`conversion`** - `From<StoreError>` and axum `IntoResponse`
//!
//! Handlers return `Result<_, BackendError>` and let `IntoResponse` pick the
//! status code and JSON body.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
