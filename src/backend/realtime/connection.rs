/**
 * Connection Handles
 *
 * A `ConnectionHandle` is the server-side face of one open duplex connection.
 * It does not own the socket directly: frames written through the handle go
 * into a bounded per-connection buffer that the session's writer task drains
 * into the transport. This keeps writers (delivery workers, the batch
 * scheduler) from ever awaiting a slow socket.
 *
 * # Identity
 *
 * Every handle carries a fresh `ConnectionId`. Two handles for the same user
 * are never equal, which is what lets the registry refuse to evict a newer
 * connection on behalf of a stale one.
 *
 * # Closing
 *
 * `close()` is idempotent and may race from several places (inactivity
 * monitor, writer fault, read loop end). Anyone holding a handle can await
 * `closed()` to be woken when that happens.
 */

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::shared::UserId;

/// Unique identifier of one connection instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport-agnostic frame
///
/// The websocket adapter in `hub` maps axum's websocket messages onto this
/// type, and tests drive sessions with plain channels of `Frame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Socket-level failure, local to one connection
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection has been closed
    #[error("connection closed")]
    Closed,

    /// The per-connection outbound buffer is full
    #[error("outbound buffer full")]
    Backlogged,

    /// The underlying websocket failed
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

struct Inner {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::Sender<Frame>,
    closed: watch::Sender<bool>,
}

/// Cloneable handle to one live connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound buffer
    ///
    /// The receiver belongs to whoever writes to the real socket.
    pub fn new(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, outbound_rx) = mpsc::channel(buffer);
        let (closed, _) = watch::channel(false);
        let handle = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                user_id,
                outbound,
                closed,
            }),
        };
        (handle, outbound_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    /// Queue a frame for the writer without waiting
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backlogged,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Queue a text frame
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.send(Frame::Text(text))
    }

    /// Mark the connection closed
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the connection has been closed
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("user_id", &self.user_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
