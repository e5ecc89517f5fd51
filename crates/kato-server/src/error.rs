//! HTTP error mapping
//!
//! Every engine error crosses the boundary as the stable wire shape
//! `{ error: { type, message, code, context, recoverable, timestamp } }`
//! with a status chosen by error kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kato_core::KatoError;

/// Engine error carried through axum handlers
pub struct ApiError(pub KatoError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<KatoError> for ApiError {
    fn from(error: KatoError) -> Self {
        Self(error)
    }
}

fn status_for(error: &KatoError) -> StatusCode {
    match error {
        KatoError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        KatoError::SessionExpired(_) => StatusCode::GONE,
        KatoError::SessionLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        KatoError::Validation(_) | KatoError::InvalidVectorDim { .. } => StatusCode::BAD_REQUEST,
        KatoError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        KatoError::StorageUnavailable { .. } | KatoError::CircuitBreakerOpen { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        KatoError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        KatoError::DataConsistency(_) => StatusCode::CONFLICT,
        KatoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }
        (status, Json(self.0.to_wire())).into_response()
    }
}
