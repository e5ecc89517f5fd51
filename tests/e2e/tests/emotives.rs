//! Emotive window and metadata accumulation behavior

use kato_core::{ConfigUpdate, Observation};
use kato_e2e_tests::TestEngine;

/// The stored window keeps one entry per emotive-carrying observation, in
/// observation order
#[tokio::test]
async fn window_preserves_per_observation_records() {
    let engine = TestEngine::in_memory("emotive-records");
    engine
        .observe_with_emotives(&["A"], &[("joy", 0.9), ("confidence", 0.8), ("energy", 0.7)])
        .await;
    engine
        .observe_with_emotives(&["B"], &[("joy", 0.5), ("confidence", 0.6), ("energy", 0.4)])
        .await;
    let name = engine.learn().await.unwrap();

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    let window = record.emotives.entries();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0]["joy"], 0.9);
    assert_eq!(window[0]["confidence"], 0.8);
    assert_eq!(window[1]["joy"], 0.5);
    assert_eq!(window[1]["energy"], 0.4);
}

/// Observations with different key sets keep their own shapes in the window
#[tokio::test]
async fn window_entries_keep_varying_key_sets() {
    let engine = TestEngine::in_memory("emotive-shapes");
    engine.observe_with_emotives(&["A"], &[("joy", 0.1)]).await;
    engine
        .observe_with_emotives(&["B"], &[("joy", 0.5), ("confidence", 0.6)])
        .await;
    engine
        .observe_with_emotives(&["C"], &[("joy", 0.7), ("confidence", 0.8), ("energy", 0.9)])
        .await;
    let name = engine.learn().await.unwrap();

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    let window = record.emotives.entries();
    assert_eq!(window.len(), 3);
    assert_eq!(window[0].len(), 1);
    assert_eq!(window[1].len(), 2);
    assert_eq!(window[2].len(), 3);
}

/// Re-learning appends to the window and drops the earliest entries beyond
/// the persistence bound
#[tokio::test]
async fn relearn_truncates_window_from_front() {
    let engine = TestEngine::in_memory("emotive-relearn");
    engine
        .update_config(ConfigUpdate {
            persistence: Some(3),
            ..Default::default()
        })
        .await;

    // First learn contributes entries 0, 1
    engine.observe_with_emotives(&["x"], &[("v", 0.0)]).await;
    engine.observe_with_emotives(&["y"], &[("v", 1.0)]).await;
    engine.learn().await.unwrap();

    // Second learn of the same sequence contributes entries 2, 3
    engine.observe_with_emotives(&["x"], &[("v", 2.0)]).await;
    engine.observe_with_emotives(&["y"], &[("v", 3.0)]).await;
    let name = engine.learn().await.unwrap();

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    let values: Vec<f64> = record
        .emotives
        .entries()
        .iter()
        .map(|entry| entry["v"])
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
}

/// Observations carrying only emotives contribute to the pending window
/// without creating an STM event
#[tokio::test]
async fn emotive_only_observation_adds_no_event() {
    let engine = TestEngine::in_memory("emotive-only");
    engine.observe_each(&["real-one", "real-two"]).await;

    let mut emotive_only = Observation::default();
    emotive_only.emotives.insert("joy".into(), 0.42);
    engine
        .manager
        .observe(&engine.session_id, &emotive_only)
        .await
        .unwrap();

    assert_eq!(
        engine.manager.get_stm(&engine.session_id).await.unwrap().len(),
        2,
        "emotive-only observations add no event"
    );

    let name = engine.learn().await.unwrap();
    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.emotives.len(), 1);
    assert_eq!(record.emotives.entries()[0]["joy"], 0.42);
}

/// Metadata value sets union across learns, never shrink
#[tokio::test]
async fn metadata_unions_across_learns() {
    let engine = TestEngine::in_memory("metadata-union");

    let mut obs = Observation {
        strings: vec!["m1".into()],
        ..Default::default()
    };
    obs.metadata
        .insert("source".into(), serde_json::json!("batch-a"));
    obs.metadata
        .insert("labels".into(), serde_json::json!(["red", "blue"]));
    engine.manager.observe(&engine.session_id, &obs).await.unwrap();
    engine.observe_strings(&engine.session_id, &["m2"]).await;
    engine.learn().await.unwrap();

    let mut obs = Observation {
        strings: vec!["m1".into()],
        ..Default::default()
    };
    obs.metadata
        .insert("source".into(), serde_json::json!("batch-b"));
    obs.metadata
        .insert("labels".into(), serde_json::json!(["blue", "green"]));
    engine.manager.observe(&engine.session_id, &obs).await.unwrap();
    engine.observe_strings(&engine.session_id, &["m2"]).await;
    let name = engine.learn().await.unwrap();

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    let metadata = record.metadata.as_map();
    assert_eq!(
        metadata["source"],
        vec![serde_json::json!("batch-a"), serde_json::json!("batch-b")]
    );
    assert_eq!(
        metadata["labels"],
        vec![
            serde_json::json!("blue"),
            serde_json::json!("green"),
            serde_json::json!("red")
        ]
    );
}

/// A pattern learned without emotives yields an empty emotive map on its
/// predictions
#[tokio::test]
async fn predictions_without_emotives_carry_empty_map() {
    let engine = TestEngine::in_memory("no-emotives");
    engine.observe_each(&["plain", "sequence", "here"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["plain", "sequence"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].emotives.is_empty());
}
