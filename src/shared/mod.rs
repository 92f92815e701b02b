//! Shared Module
//!
//! Types shared between the server and its clients. Everything here is
//! serializable and independent of the transport, so the same structures are
//! used for websocket frames, HTTP responses and the delivery pipeline.

/// Chat message and frame encoding
pub mod message;

/// Shared error types
pub mod error;

/// Re-export commonly used types for convenience
pub use message::{encode_batch, ChatMessage, MessageId, ServerNotice, UserId};
pub use error::{FrameError, ValidationError};
