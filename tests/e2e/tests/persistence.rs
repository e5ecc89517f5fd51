//! Durability: patterns, counters, and indices persist; sessions do not

use kato_core::{GenesConfig, pattern_name};
use kato_e2e_tests::{TestEngine, events, manager_for};
use tempfile::TempDir;

/// Patterns survive a process restart; sessions are volatile
#[tokio::test]
async fn kb_survives_restart_sessions_do_not() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("kato.db");

    let learned_name;
    let old_session;
    {
        let manager = manager_for(db_path.clone());
        let session = manager.create_session("durable", None, None).unwrap();
        old_session = session.session_id.clone();
        for item in ["persist", "across", "restart"] {
            let obs = kato_core::Observation {
                strings: vec![item.to_string()],
                ..Default::default()
            };
            manager.observe(&session.session_id, &obs).await.unwrap();
        }
        learned_name = manager
            .learn(&session.session_id)
            .await
            .unwrap()
            .expect("learned");
    }

    // "Restart": a fresh manager over the same database
    let manager = manager_for(db_path);
    let session = manager.create_session("durable", None, None).unwrap();

    // The old session is gone
    assert!(manager.get_stm(&old_session).await.is_err());

    // The pattern is not
    let record = manager
        .pattern_record_for_session(&session.session_id, &learned_name)
        .await
        .unwrap()
        .expect("pattern persisted");
    assert_eq!(record.frequency, 1);
    assert_eq!(
        record.pattern_data,
        events(&[&["persist"], &["across"], &["restart"]])
    );

    // And predictions reconstruct deterministically from the tiers
    for item in ["persist", "across"] {
        let obs = kato_core::Observation {
            strings: vec![item.to_string()],
            ..Default::default()
        };
        manager.observe(&session.session_id, &obs).await.unwrap();
    }
    let predictions = manager.get_predictions(&session.session_id).await.unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].name, learned_name);
    assert_eq!(predictions[0].future, events(&[&["restart"]]));
}

/// The SQLite-backed engine matches the in-memory engine's behavior
#[tokio::test]
async fn sqlite_and_memory_agree() {
    let memory = TestEngine::in_memory("agree");
    let sqlite = TestEngine::sqlite("agree");

    for engine in [&memory, &sqlite] {
        engine.observe_each(&["one", "two", "three"]).await;
        engine.learn().await.unwrap();
        engine.observe_each(&["one", "two"]).await;
    }

    let from_memory = memory.predictions().await;
    let from_sqlite = sqlite.predictions().await;
    assert_eq!(
        serde_json::to_string(&from_memory).unwrap(),
        serde_json::to_string(&from_sqlite).unwrap(),
        "identical KB state must yield identical predictions"
    );
}

/// Index repair backfills rows lost in the body/index crash window
#[tokio::test]
async fn repair_backfills_missing_index_rows() {
    let temp_dir = TempDir::new().unwrap();
    let config = GenesConfig::default();
    let kb = kato_core::KbId::from_node_id("repair");
    let seq = events(&[&["crash"], &["window"]]);
    let name = pattern_name(&seq);

    let tiers = kato_core::Tiers::sqlite(temp_dir.path().join("kato.db")).unwrap();
    let writer = kato_core::PatternWriter::new(tiers.clone());

    // Simulate a crash after the body write: body present, no index row
    tiers.store.put_if_absent(&kb, &name, &seq).await.unwrap();
    assert!(tiers.index.get(&kb, &name).await.unwrap().is_none());

    let repaired = writer.repair_index(&kb, &config).await.unwrap();
    assert_eq!(repaired, 1);
    let row = tiers.index.get(&kb, &name).await.unwrap().expect("row rebuilt");
    assert_eq!(row.pattern_data, seq);
    assert_eq!(row.length, 2);

    // A consistent KB needs no further repair
    assert_eq!(writer.repair_index(&kb, &config).await.unwrap(), 0);
}

/// Re-learning across restarts accumulates frequency on one pattern
#[tokio::test]
async fn frequency_accumulates_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("kato.db");
    let seq = ["same", "again"];

    let mut name = String::new();
    for _ in 0..3 {
        let manager = manager_for(db_path.clone());
        let session = manager.create_session("repeat", None, None).unwrap();
        for item in seq {
            let obs = kato_core::Observation {
                strings: vec![item.to_string()],
                ..Default::default()
            };
            manager.observe(&session.session_id, &obs).await.unwrap();
        }
        name = manager.learn(&session.session_id).await.unwrap().unwrap();
    }

    let manager = manager_for(db_path);
    let session = manager.create_session("repeat", None, None).unwrap();
    let record = manager
        .pattern_record_for_session(&session.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.frequency, 3);
}
