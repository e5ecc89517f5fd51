//! Health, metrics, and pattern retrieval endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kato_core::{KatoError, KbId};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /health (and /status)
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.manager.stats().uptime_seconds(),
        "open_sessions": state.manager.open_sessions(),
        "version": kato_core::VERSION,
    }))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.manager.stats().snapshot();
    Json(json!({
        "open_sessions": state.manager.open_sessions(),
        "counters": snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PatternQuery {
    #[serde(default)]
    pub kb_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// GET /pattern/{name}?kb_id=... | ?session_id=...
pub async fn get_pattern(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PatternQuery>,
) -> ApiResult<Response> {
    let record = match (&query.kb_id, &query.session_id) {
        (Some(kb_id), _) => {
            state
                .manager
                .pattern_record(&KbId::from_node_id(kb_id), &name)
                .await?
        }
        (None, Some(session_id)) => {
            state
                .manager
                .pattern_record_for_session(session_id, &name)
                .await?
        }
        (None, None) => {
            return Err(ApiError(KatoError::Validation(
                "kb_id or session_id query parameter is required".into(),
            )));
        }
    };

    match record {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {
                    "type": "PATTERN_NOT_FOUND",
                    "message": format!("pattern {name} not found"),
                    "code": "PATTERN_NOT_FOUND",
                    "recoverable": true,
                    "timestamp": chrono::Utc::now(),
                }
            })),
        )
            .into_response()),
    }
}
