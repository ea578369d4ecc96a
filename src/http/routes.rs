use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Live transcription stream (browser WebSocket)
        .route("/transcribe", get(ws::transcribe_ws))
        // Blocking API for non-streaming callers
        .route("/transcriptions", post(handlers::start_transcription))
        .route(
            "/transcriptions/:user_id/:episode_id",
            get(handlers::get_transcription),
        )
        // Request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
