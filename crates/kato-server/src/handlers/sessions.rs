//! Session lifecycle and configuration endpoints

use axum::Json;
use axum::extract::{Path, State};
use kato_core::ConfigUpdate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub node_id: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub node_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// POST /sessions
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let info = state
        .manager
        .create_session(&request.node_id, request.ttl_seconds, request.metadata)?;
    tracing::info!(session_id = %info.session_id, node_id = %info.node_id, "Created session");
    Ok(Json(CreateSessionResponse {
        session_id: info.session_id,
        node_id: info.node_id,
        created_at: info.created_at,
    }))
}

/// GET /sessions/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<kato_core::SessionInfo>> {
    Ok(Json(state.manager.get_session(&session_id).await?))
}

/// DELETE /sessions/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.manager.delete_session(&session_id)?;
    tracing::info!(%session_id, "Deleted session");
    Ok(Json(json!({ "status": "ok" })))
}

/// POST /sessions/{id}/config
pub async fn update_config(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    state.manager.update_config(&session_id, &update).await?;
    Ok(Json(json!({ "status": "okay" })))
}

/// GET /sessions/{id}/config
pub async fn get_config(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let config = state.manager.effective_config(&session_id).await?;
    Ok(Json(serde_json::to_value(config.to_wire()).map_err(kato_core::KatoError::from)?))
}
