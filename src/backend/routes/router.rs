/**
 * Router Configuration
 *
 * Builds the axum router over `AppState`. Requests are traced with
 * `TraceLayer`; CORS is permissive so browser clients on other origins can
 * reach the API.
 */

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::backend::chat::handlers::{chat_history, chat_socket, create_message, list_conversations};
use crate::backend::server::state::AppState;

pub fn create_router(app_state: AppState) -> Router<()> {
    Router::new()
        .route("/ws/chat", get(chat_socket))
        .route(
            "/api/chat/{username}",
            get(chat_history).post(create_message),
        )
        .route("/api/messages", get(list_conversations))
        .route("/health", get(|| async { "OK" }))
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "404 Not Found") })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
