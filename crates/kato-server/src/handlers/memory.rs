//! Observation, learning, and prediction endpoints

use axum::Json;
use axum::extract::{Path, State};
use kato_core::{Observation, ObserveAck, SequenceOutcome};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /sessions/{id}/observe
pub async fn observe(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(observation): Json<Observation>,
) -> ApiResult<Json<ObserveAck>> {
    Ok(Json(state.manager.observe(&session_id, &observation).await?))
}

#[derive(Debug, Deserialize)]
pub struct ObserveSequenceRequest {
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub learn_after_each: bool,
    #[serde(default)]
    pub learn_at_end: bool,
    #[serde(default)]
    pub clear_stm_between: bool,
}

/// POST /sessions/{id}/observe-sequence
pub async fn observe_sequence(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ObserveSequenceRequest>,
) -> ApiResult<Json<SequenceOutcome>> {
    let outcome = state
        .manager
        .observe_sequence(
            &session_id,
            &request.observations,
            request.learn_after_each,
            request.learn_at_end,
            request.clear_stm_between,
        )
        .await?;
    Ok(Json(outcome))
}

/// GET /sessions/{id}/stm
pub async fn get_stm(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let stm = state.manager.get_stm(&session_id).await?;
    Ok(Json(json!({ "stm": stm })))
}

/// POST /sessions/{id}/clear-stm
pub async fn clear_stm(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.manager.clear_stm(&session_id).await?;
    Ok(Json(json!({ "status": "cleared" })))
}

/// POST /sessions/{id}/clear-all
pub async fn clear_all(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.manager.clear_all_memory(&session_id).await?;
    tracing::info!(%session_id, removed, "Cleared session STM and knowledge base");
    Ok(Json(json!({ "status": "all-cleared" })))
}

/// POST /sessions/{id}/learn
pub async fn learn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let pattern_name = state.manager.learn(&session_id).await?;
    Ok(Json(json!({
        "status": "learned",
        "pattern_name": pattern_name,
    })))
}

/// GET /sessions/{id}/predictions
pub async fn get_predictions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let predictions = state.manager.get_predictions(&session_id).await?;
    Ok(Json(json!({
        "count": predictions.len(),
        "predictions": predictions,
    })))
}

/// POST /sessions/{id}/repair-index
pub async fn repair_index(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let repaired = state.manager.repair_index(&session_id).await?;
    Ok(Json(json!({ "status": "okay", "repaired": repaired })))
}
