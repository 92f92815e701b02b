/**
 * Chat Session
 *
 * Drives one connection from registration to teardown. A session:
 *
 * 1. creates a `ConnectionHandle` and registers it, replacing any older
 *    connection for the same user
 * 2. starts the connection's `InactivityMonitor`
 * 3. spawns a writer task that drains the handle's outbound buffer into the
 *    transport and sends periodic pings
 * 4. reads frames until the peer leaves, the connection is closed elsewhere,
 *    the keep-alive window passes without traffic, or a frame fails to decode
 *
 * Teardown is the same on every exit path: deregister (identity-checked),
 * stop the monitor, let the writer flush and send a close frame. A writer
 * still blocked on the transport after a short grace period is aborted.
 *
 * # Two timers
 *
 * The inactivity monitor tracks application messages only. The keep-alive
 * window (longer) is refreshed by any inbound frame, pings and pongs
 * included, and guards against dead transports.
 *
 * The session is generic over the transport so tests can drive it with
 * in-memory channels; `hub` adapts axum websockets onto it.
 */

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::connection::{ConnectionHandle, Frame, TransportError};
use super::monitor::InactivityMonitor;
use super::registry::ConnectionRegistry;
use crate::backend::chat::ChatService;
use crate::backend::error::BackendError;
use crate::shared::{ChatMessage, FrameError, ServerNotice, UserId};

/// How long teardown waits for the writer to flush
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Per-connection timing and buffering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Application-level silence before the connection is closed
    pub idle_timeout: Duration,
    /// Transport-level silence (any frame) before the connection is dropped
    pub keepalive_timeout: Duration,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Capacity of the per-connection outbound buffer, in frames
    pub outbound_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(25),
            outbound_buffer: 64,
        }
    }
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Closed from the server side (inactivity, replacement, writer fault)
    Closed,
    /// The peer sent a close frame or the stream ended
    PeerClosed,
    /// No inbound traffic within the keep-alive window
    KeepaliveExpired,
    /// Reading from the transport failed
    Transport(TransportError),
    /// An inbound data frame could not be decoded
    Malformed(FrameError),
}

/// Lifecycle driver for one connection
pub struct ChatSession {
    registry: ConnectionRegistry,
    service: Arc<ChatService>,
    settings: SessionSettings,
}

impl ChatSession {
    pub fn new(
        registry: ConnectionRegistry,
        service: Arc<ChatService>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            registry,
            service,
            settings,
        }
    }

    /// Run the session for `user_id` until it ends
    pub async fn run<R, W>(self, user_id: UserId, mut reader: R, writer: W) -> SessionEnd
    where
        R: Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
        W: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
    {
        let (handle, outbound) = ConnectionHandle::new(user_id, self.settings.outbound_buffer);
        self.registry.register(handle.clone()).await;

        let mut writer_task = tokio::spawn(write_loop(
            handle.clone(),
            self.registry.clone(),
            outbound,
            writer,
            self.settings.ping_interval,
        ));
        let monitor = InactivityMonitor::spawn(
            handle.clone(),
            self.registry.clone(),
            self.settings.idle_timeout,
        );

        let closed = handle.closed();
        tokio::pin!(closed);

        let end = loop {
            tokio::select! {
                _ = &mut closed => break SessionEnd::Closed,
                next = tokio::time::timeout(self.settings.keepalive_timeout, reader.next()) => {
                    let frame = match next {
                        Err(_) => break SessionEnd::KeepaliveExpired,
                        Ok(None) => break SessionEnd::PeerClosed,
                        Ok(Some(Err(e))) => break SessionEnd::Transport(e),
                        Ok(Some(Ok(frame))) => frame,
                    };
                    let decoded = match frame {
                        Frame::Text(text) => ChatMessage::decode(&text),
                        Frame::Binary(bytes) => ChatMessage::decode_bytes(&bytes),
                        Frame::Ping(_) | Frame::Pong(_) => continue,
                        Frame::Close => break SessionEnd::PeerClosed,
                    };
                    match decoded {
                        Ok(message) => {
                            monitor.touch();
                            self.accept(&handle, message).await;
                        }
                        Err(e) => break SessionEnd::Malformed(e),
                    }
                }
            }
        };

        let connection_id = handle.id();
        let idle = monitor.state();
        match &end {
            SessionEnd::Closed | SessionEnd::PeerClosed => {
                info!(user_id, %connection_id, reason = ?end, monitor = ?idle, "session ended")
            }
            _ => warn!(user_id, %connection_id, reason = ?end, monitor = ?idle, "session ended"),
        }

        self.registry.deregister(&handle).await;
        monitor.stop().await;
        if tokio::time::timeout(WRITER_GRACE, &mut writer_task).await.is_err() {
            // A stalled peer would otherwise keep the sink alive
            writer_task.abort();
            debug!(connection_id = %handle.id(), "writer aborted after grace period");
        }
        end
    }

    /// Hand a decoded message to the delivery path
    ///
    /// The sender is always the connection's user. Validation and store
    /// failures are reported to the sender only and keep the session open.
    async fn accept(&self, handle: &ConnectionHandle, mut message: ChatMessage) {
        message.sender = handle.user_id();
        if let Err(e) = self.service.dispatch(message).await {
            debug!(user_id = handle.user_id(), error = %e, "rejected inbound message");
            if let Err(e) = report(handle, &e) {
                debug!(user_id = handle.user_id(), error = %e, "could not report error to sender");
            }
        }
    }
}

/// Write an `{"error": ...}` notice to the sender's own connection
fn report(handle: &ConnectionHandle, error: &BackendError) -> Result<(), BackendError> {
    let notice = ServerNotice::error(error.message()).encode()?;
    handle.send_text(notice)?;
    Ok(())
}

async fn write_loop<W>(
    handle: ConnectionHandle,
    registry: ConnectionRegistry,
    mut outbound: mpsc::Receiver<Frame>,
    mut sink: W,
    ping_interval: Duration,
) where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let closed = handle.closed();
    tokio::pin!(closed);
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let result = tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => sink.send(frame).await,
                None => break,
            },
            _ = &mut closed => break,
            _ = ping.tick() => sink.send(Frame::Ping(Vec::new())).await,
        };
        if let Err(e) = result {
            warn!(
                user_id = handle.user_id(),
                connection_id = %handle.id(),
                error = %e,
                "write failed, closing connection"
            );
            registry.deregister(&handle).await;
            return;
        }
    }

    // Frames queued before the close still go out
    while let Ok(frame) = outbound.try_recv() {
        if sink.send(frame).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Frame::Close).await;
    let _ = sink.close().await;
}
