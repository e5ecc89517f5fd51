//! Router assembly

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use crate::handlers::{memory, sessions, system};
use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/sessions", post(sessions::create))
        .route("/sessions/{id}", get(sessions::get).delete(sessions::delete))
        // Observation and learning
        .route("/sessions/{id}/observe", post(memory::observe))
        .route("/sessions/{id}/observe-sequence", post(memory::observe_sequence))
        .route("/sessions/{id}/stm", get(memory::get_stm))
        .route("/sessions/{id}/clear-stm", post(memory::clear_stm))
        .route("/sessions/{id}/clear-all", post(memory::clear_all))
        .route("/sessions/{id}/learn", post(memory::learn))
        .route("/sessions/{id}/predictions", get(memory::get_predictions))
        .route("/sessions/{id}/repair-index", post(memory::repair_index))
        // Session configuration
        .route(
            "/sessions/{id}/config",
            post(sessions::update_config).get(sessions::get_config),
        )
        // Patterns and system surface
        .route("/pattern/{name}", get(system::get_pattern))
        .route("/health", get(system::health))
        .route("/status", get(system::health))
        .route("/metrics", get(system::metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
