/**
 * Application State
 *
 * `AppState` is the router state. Handlers extract only the piece they need
 * (`State<Arc<ChatService>>`, `State<RealtimeHub>`, ...) through the
 * `FromRef` implementations below.
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::auth::JwtSecret;
use crate::backend::chat::ChatService;
use crate::backend::realtime::{ConnectionRegistry, DeliveryWorkerPool, RealtimeHub};

#[derive(Clone)]
pub struct AppState {
    /// Send path and read models
    pub chat: Arc<ChatService>,

    /// Registry, chat service and session settings for websocket sessions
    pub hub: RealtimeHub,

    /// Delivery workers; shut down by `main` after the server stops
    pub pool: Arc<DeliveryWorkerPool>,

    pub jwt_secret: JwtSecret,
}

impl AppState {
    pub fn registry(&self) -> &ConnectionRegistry {
        self.hub.registry()
    }
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.chat.clone()
    }
}

impl FromRef<AppState> for RealtimeHub {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.hub.clone()
    }
}

impl FromRef<AppState> for JwtSecret {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.jwt_secret.clone()
    }
}
