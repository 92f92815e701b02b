/**
 * Realtime Hub
 *
 * Bundles what every chat session needs (the connection registry, the chat
 * service and the session settings) and adapts axum websockets onto the
 * transport-agnostic `Frame` stream the session runs on.
 */

use std::future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::connection::{Frame, TransportError};
use super::registry::ConnectionRegistry;
use super::session::{ChatSession, SessionEnd, SessionSettings};
use crate::backend::chat::ChatService;
use crate::shared::UserId;

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Ping(bytes) => Frame::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Frame::Pong(bytes.to_vec()),
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping(bytes) => Message::Ping(bytes.into()),
            Frame::Pong(bytes) => Message::Pong(bytes.into()),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Shared entry point for live connections
#[derive(Clone)]
pub struct RealtimeHub {
    registry: ConnectionRegistry,
    service: Arc<ChatService>,
    settings: SessionSettings,
}

impl RealtimeHub {
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

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// A fresh session bound to this hub
    pub fn session(&self) -> ChatSession {
        ChatSession::new(
            self.registry.clone(),
            self.service.clone(),
            self.settings.clone(),
        )
    }

    /// Run a chat session over an upgraded websocket
    pub async fn serve_websocket(&self, user_id: UserId, socket: WebSocket) -> SessionEnd {
        let (sink, stream) = socket.split();
        let reader = stream.map(|message| message.map(Frame::from).map_err(TransportError::from));
        let writer = sink
            .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))))
            .sink_map_err(TransportError::from);
        self.session().run(user_id, reader, writer).await
    }
}
