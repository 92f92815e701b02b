//! Shared test fixtures
//!
//! - an in-memory store seeded with alice (1), bob (2) and carol (3)
//! - app state built over that store
//! - a fake transport made of `futures` channels, so sessions run without
//!   real sockets

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;

use pigeon::backend::auth::{create_token, JwtSecret};
use pigeon::backend::realtime::{ConnectionId, Frame, SessionEnd, SessionSettings, TransportError};
use pigeon::backend::server::{build_state, AppState, ServerConfig};
use pigeon::backend::storage::InMemoryStore;
use pigeon::shared::{ChatMessage, UserId};

pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const CAROL: UserId = 3;

pub const TEST_SECRET: &str = "integration-test-secret";

/// How long a test waits for something that should happen promptly
pub const PATIENCE: Duration = Duration::from_secs(2);

pub struct Harness {
    pub store: InMemoryStore,
    pub state: AppState,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_session(session: SessionSettings) -> Self {
        let mut config = test_config();
        config.session = session;
        Self::with_config(config).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let store = seeded_store().await;
        let state = build_state(&config, Arc::new(store.clone()), Arc::new(store.clone()));
        Self { store, state }
    }

    pub fn token(&self, user_id: UserId) -> String {
        create_token(user_id, &JwtSecret::new(TEST_SECRET)).expect("token")
    }

    /// Start a session for `user_id` over a fake transport
    ///
    /// Returns once the new connection is registered.
    pub async fn connect(&self, user_id: UserId) -> Client {
        let previous = self.state.registry().lookup(user_id).await.map(|h| h.id());
        let (peer, reader, writer) = transport();
        let session = self.state.hub.session();
        let task = tokio::spawn(async move { session.run(user_id, reader, writer).await });

        self.wait_for_connection(user_id, previous).await;
        Client { user_id, peer, task }
    }

    /// Wait until a connection other than `previous` is registered for `user_id`
    pub async fn wait_for_connection(&self, user_id: UserId, previous: Option<ConnectionId>) {
        let registry = self.state.registry().clone();
        tokio::time::timeout(PATIENCE, async move {
            loop {
                match registry.lookup(user_id).await {
                    Some(handle) if Some(handle.id()) != previous => break,
                    _ => tokio::task::yield_now().await,
                }
            }
        })
        .await
        .expect("session should register");
    }

    /// Wait until `condition` holds on the store's message count
    pub async fn wait_for_messages(&self, count: usize) {
        let store = self.store.clone();
        tokio::time::timeout(PATIENCE, async move {
            while store.message_count().await < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("messages should be saved");
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::builder()
        .jwt_secret(TEST_SECRET)
        .build()
        .expect("valid test config")
}

pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.add_user("alice", "Alice", None).await;
    store.add_user("bob", "Bob", Some(vec![0x89, 0x50, 0x4e, 0x47])).await;
    store.add_user("carol", "Carol", None).await;
    store
}

/// The client's ends of a fake transport
pub struct Peer {
    pub to_server: UnboundedSender<Result<Frame, TransportError>>,
    pub from_server: UnboundedReceiver<Frame>,
}

pub type Reader = UnboundedReceiver<Result<Frame, TransportError>>;

pub fn transport() -> (
    Peer,
    Reader,
    impl futures::Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
) {
    let (to_server, reader) = unbounded();
    let (writer, from_server) = unbounded::<Frame>();
    let writer = writer.sink_map_err(|_| TransportError::Closed);
    (
        Peer {
            to_server,
            from_server,
        },
        reader,
        writer,
    )
}

/// One connected fake client
pub struct Client {
    pub user_id: UserId,
    pub peer: Peer,
    pub task: JoinHandle<SessionEnd>,
}

impl Client {
    pub fn send_frame(&self, frame: Frame) {
        self.peer
            .to_server
            .unbounded_send(Ok(frame))
            .expect("session reader alive");
    }

    pub fn send_json(&self, value: serde_json::Value) {
        self.send_frame(Frame::Text(value.to_string()));
    }

    /// Send `content` to `recipient`
    pub fn say(&self, recipient: UserId, content: &str) {
        self.send_json(serde_json::json!({ "recipient": recipient, "content": content }));
    }

    /// Next non-ping frame from the server
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(PATIENCE, async {
            loop {
                match self.peer.from_server.next().await {
                    Some(Frame::Ping(_)) => continue,
                    other => return other,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Next frame, decoded as a single message
    pub async fn next_message(&mut self) -> ChatMessage {
        match self.next_frame().await {
            Some(Frame::Text(text)) => ChatMessage::decode(&text).expect("message frame"),
            other => panic!("expected a message frame, got {:?}", other),
        }
    }

    /// Next frame, decoded as JSON
    pub async fn next_json(&mut self) -> serde_json::Value {
        match self.next_frame().await {
            Some(Frame::Text(text)) => serde_json::from_str(&text).expect("json frame"),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    /// Wait for the session task to finish
    pub async fn ended(self) -> SessionEnd {
        tokio::time::timeout(PATIENCE, self.task)
            .await
            .expect("session should end")
            .expect("session task should not panic")
    }
}
