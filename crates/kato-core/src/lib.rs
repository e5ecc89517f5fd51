//! # KATO Core
//!
//! Deterministic sequence-learning and prediction engine. Clients submit
//! ordered observations (symbols, dense vectors, emotive scalars, metadata);
//! the engine accumulates them in per-session short-term memory, learns
//! patterns into a per-tenant knowledge base, and returns predictions that
//! explain how the current STM aligns temporally with stored patterns.
//!
//! - **Observation pipeline**: per-event symbol sorting, `VCTR|` vector
//!   surrogates, auto-learn on a configurable STM bound
//! - **Pattern identity**: `PTRN|` + SHA-1 of the canonical event sequence,
//!   stable across runs, processes, and machines
//! - **Candidate filtering**: configurable length / Jaccard / MinHash-LSH /
//!   prefix / suffix pipeline over pre-computed indices
//! - **Temporal alignment**: past / present / future / missing / extras
//!   decomposition with fuzzy-token anomaly detection
//! - **Three storage tiers**: document bodies, columnar filter indices, and
//!   a key-value counter store, each namespaced per knowledge base
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kato_core::{GenesConfig, Observation, SessionLimits, SessionManager, Tiers};
//!
//! let manager = SessionManager::new(
//!     Tiers::in_memory(),
//!     GenesConfig::default(),
//!     SessionLimits::default(),
//!     Default::default(),
//! );
//!
//! let session = manager.create_session("tenant-1", None, None)?;
//! manager.observe(&session.session_id, &Observation {
//!     strings: vec!["hello".into()],
//!     ..Default::default()
//! }).await?;
//! let pattern = manager.learn(&session.session_id).await?;
//! let predictions = manager.get_predictions(&session.session_id).await?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod align;
pub mod config;
pub mod emotives;
pub mod error;
pub mod filters;
pub mod learn;
pub mod observation;
pub mod pattern;
pub mod predict;
pub mod session;
pub mod similarity;
pub mod stats;
pub mod stm;
pub mod storage;

mod hashing;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{KatoError, Result, WireError};

// Configuration
pub use config::{
    ConfigUpdate, FilterStage, GenesConfig, IndexerType, RankSortAlgo, StmMode,
};

// Observation intake
pub use observation::{Event, Observation, canonicalize, vector_symbol};

// Short-term memory
pub use stm::ShortTermMemory;

// Emotives and metadata
pub use emotives::{EmotiveRecord, EmotiveWindow, MetadataSets};

// Pattern identity
pub use pattern::{PATTERN_PREFIX, PatternRecord, canonical_sequence, pattern_name, stm_unique_id};

// Learning
pub use learn::{LearnOutcome, PatternWriter};

// Alignment and prediction
pub use align::{Anomaly, TemporalAlignment, align_temporal};
pub use predict::{Prediction, PredictionAssembler};

// Session management
pub use session::{
    ObserveAck, SequenceOutcome, Session, SessionInfo, SessionLimits, SessionManager,
};

// Engine counters
pub use stats::{EngineStats, StatsSnapshot};

// Storage tiers
pub use storage::{
    CounterStore, IndexRow, KbId, PatternIndex, PatternStore, Tiers,
    guard::{Guard, GuardPolicy},
    memory::MemoryTiers,
    sqlite::SqliteTiers,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ConfigUpdate, GenesConfig, KatoError, Observation, Prediction, Result, SessionLimits,
        SessionManager, StmMode, Tiers,
    };
}
