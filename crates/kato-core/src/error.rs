//! Error taxonomy
//!
//! Every failure the engine can surface maps to one stable wire code. The
//! split between recoverable and unrecoverable kinds drives client retry
//! behavior and the HTTP status chosen by the transport layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum KatoError {
    /// Unknown or deleted session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session TTL elapsed
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Session table ceiling reached
    #[error("Session limit exceeded: {limit} sessions already open")]
    SessionLimitExceeded { limit: usize },

    /// Malformed input or bad config value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Vector dimensionality mismatch within a session
    #[error("Invalid vector dimension: expected {expected}, got {got}")]
    InvalidVectorDim { expected: usize, got: usize },

    /// Storage tier connection failure
    #[error("Storage unavailable ({tier}): {detail}")]
    StorageUnavailable { tier: &'static str, detail: String },

    /// Too many recent storage failures; failing fast
    #[error("Circuit breaker open for {tier} tier")]
    CircuitBreakerOpen { tier: &'static str },

    /// Index row without body, counter corruption
    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    /// Unrecognized enum value or unusable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Deadline exceeded during storage I/O
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KatoError {
    /// Stable machine-readable wire code
    pub fn code(&self) -> &'static str {
        match self {
            KatoError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            KatoError::SessionExpired(_) => "SESSION_EXPIRED",
            KatoError::SessionLimitExceeded { .. } => "SESSION_LIMIT_EXCEEDED",
            KatoError::Validation(_) => "VALIDATION_ERROR",
            KatoError::InvalidVectorDim { .. } => "INVALID_VECTOR_DIM",
            KatoError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            KatoError::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            KatoError::DataConsistency(_) => "DATA_CONSISTENCY_ERROR",
            KatoError::Configuration(_) => "CONFIGURATION_ERROR",
            KatoError::Timeout(_) => "TIMEOUT",
            KatoError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client retry (possibly after corrective action) can succeed
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            KatoError::DataConsistency(_)
                | KatoError::Configuration(_)
                | KatoError::Internal(_)
        )
    }

    /// Build the user-visible failure shape
    pub fn to_wire(&self) -> WireError {
        WireError {
            error: WireErrorBody {
                r#type: self.code(),
                message: self.to_string(),
                code: self.code(),
                context: None,
                recoverable: self.recoverable(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// `{ error: { type, message, code, context, recoverable, timestamp } }`
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub error: WireErrorBody,
}

/// Body of the wire error envelope
#[derive(Debug, Clone, Serialize)]
pub struct WireErrorBody {
    pub r#type: &'static str,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

/// Engine result type
pub type Result<T> = std::result::Result<T, KatoError>;

impl From<rusqlite::Error> for KatoError {
    fn from(e: rusqlite::Error) -> Self {
        KatoError::StorageUnavailable {
            tier: "sqlite",
            detail: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for KatoError {
    fn from(e: serde_json::Error) -> Self {
        KatoError::Internal(format!("JSON codec failure: {e}"))
    }
}
