/**
 * Server Initialization
 *
 * Builds the application from a `ServerConfig`:
 *
 * 1. pick the storage backend (PostgreSQL when configured, memory otherwise)
 * 2. start the delivery worker pool over a fresh connection registry
 * 3. assemble the chat service, realtime hub and app state
 * 4. build the router
 */

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::backend::auth::JwtSecret;
use crate::backend::chat::ChatService;
use crate::backend::realtime::{ConnectionRegistry, DeliveryWorkerPool, RealtimeHub};
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_database, ConfigError, ServerConfig};
use crate::backend::server::state::AppState;
use crate::backend::storage::{InMemoryStore, MessageStore, PgStore, UserDirectory};

/// Wire the app state over the given stores
///
/// Starts the delivery workers, so it must run inside a tokio runtime.
pub fn build_state(
    config: &ServerConfig,
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
) -> AppState {
    let registry = ConnectionRegistry::new();
    let pool = Arc::new(DeliveryWorkerPool::start(&config.delivery, registry.clone()));
    let chat = Arc::new(ChatService::new(messages, users, pool.clone()));
    let hub = RealtimeHub::new(registry, chat.clone(), config.session.clone());

    AppState {
        chat,
        hub,
        pool,
        jwt_secret: JwtSecret::new(config.jwt_secret.as_str()),
    }
}

/// Create the router and the state backing it
///
/// The returned state is kept by the caller to shut the worker pool down
/// after the server stops.
pub async fn create_app(config: &ServerConfig) -> Result<(Router<()>, AppState), ConfigError> {
    info!("initializing pigeon backend");

    let state = match load_database(config).await? {
        Some(pool) => {
            let store = Arc::new(PgStore::new(pool));
            build_state(config, store.clone(), store)
        }
        None => {
            let store = Arc::new(InMemoryStore::new());
            build_state(config, store.clone(), store)
        }
    };

    let router = create_router(state.clone());
    info!("router configured");
    Ok((router, state))
}
