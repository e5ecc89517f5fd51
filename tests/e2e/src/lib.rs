//! Shared harness for KATO end-to-end tests
//!
//! Builds an isolated engine per test (in-memory tiers by default, SQLite on
//! request) and provides the observe/learn shorthand the scenario suites
//! lean on.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use kato_core::{
    ConfigUpdate, EngineStats, GenesConfig, Observation, Prediction, SessionLimits,
    SessionManager, Tiers,
};
use tempfile::TempDir;

/// One isolated engine plus a default session
pub struct TestEngine {
    pub manager: Arc<SessionManager>,
    pub session_id: String,
    /// Kept alive so SQLite-backed engines keep their database file
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Engine over in-memory tiers with one session on `node_id`
    pub fn in_memory(node_id: &str) -> Self {
        let manager = Arc::new(SessionManager::new(
            Tiers::in_memory(),
            GenesConfig::default(),
            SessionLimits::default(),
            Arc::new(EngineStats::new()),
        ));
        let session = manager
            .create_session(node_id, None, None)
            .expect("create session");
        Self {
            manager,
            session_id: session.session_id,
            _temp_dir: None,
        }
    }

    /// Engine over a fresh SQLite database
    pub fn sqlite(node_id: &str) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let manager = manager_for(temp_dir.path().join("kato.db"));
        let session = manager
            .create_session(node_id, None, None)
            .expect("create session");
        Self {
            manager,
            session_id: session.session_id,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Open a second session, optionally on a different node
    pub fn open_session(&self, node_id: &str) -> String {
        self.manager
            .create_session(node_id, None, None)
            .expect("create session")
            .session_id
    }

    /// Observe one event of plain strings
    pub async fn observe_strings(&self, session_id: &str, strings: &[&str]) {
        let observation = Observation {
            strings: strings.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        self.manager
            .observe(session_id, &observation)
            .await
            .expect("observe");
    }

    /// Observe a sequence of single-string events on the default session
    pub async fn observe_each(&self, items: &[&str]) {
        for item in items {
            self.observe_strings(&self.session_id, &[item]).await;
        }
    }

    /// Observe one event carrying emotives
    pub async fn observe_with_emotives(&self, strings: &[&str], emotives: &[(&str, f64)]) {
        let observation = Observation {
            strings: strings.iter().map(|s| s.to_string()).collect(),
            emotives: emotives
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        };
        self.manager
            .observe(&self.session_id, &observation)
            .await
            .expect("observe");
    }

    pub async fn learn(&self) -> Option<String> {
        self.manager.learn(&self.session_id).await.expect("learn")
    }

    pub async fn clear_stm(&self) {
        self.manager
            .clear_stm(&self.session_id)
            .await
            .expect("clear stm");
    }

    pub async fn predictions(&self) -> Vec<Prediction> {
        self.manager
            .get_predictions(&self.session_id)
            .await
            .expect("predictions")
    }

    pub async fn update_config(&self, update: ConfigUpdate) {
        self.manager
            .update_config(&self.session_id, &update)
            .await
            .expect("config update");
    }
}

/// Session manager over a SQLite file (reopenable across "restarts")
pub fn manager_for(db_path: PathBuf) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Tiers::sqlite(db_path).expect("open sqlite tiers"),
        GenesConfig::default(),
        SessionLimits::default(),
        Arc::new(EngineStats::new()),
    ))
}

/// Events helper: `events(&[&["a"], &["b"]])`
pub fn events(raw: &[&[&str]]) -> Vec<Vec<String>> {
    raw.iter()
        .map(|event| event.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// Assert the structural alignment contract on one prediction
pub fn assert_alignment_contract(prediction: &Prediction, stm_len: usize) {
    assert_eq!(
        prediction.missing.len(),
        prediction.present.len(),
        "missing must align with present events"
    );
    assert_eq!(
        prediction.extras.len(),
        stm_len,
        "extras must align with observed events"
    );
    for missing_event in &prediction.missing {
        for symbol in missing_event {
            assert!(
                prediction.present.iter().any(|event| event.contains(symbol)),
                "missing symbol {symbol} must appear in some present event"
            );
        }
    }
    let all_missing: Vec<&String> = prediction.missing.iter().flatten().collect();
    for matched in &prediction.matches {
        assert!(
            !all_missing.contains(&matched),
            "matched symbol {matched} must not be reported missing"
        );
    }
}
