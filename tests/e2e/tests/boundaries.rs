//! Boundary behavior: auto-learn modes, emotive windows, thresholds

use kato_core::{ConfigUpdate, KatoError, Observation};
use kato_e2e_tests::TestEngine;

/// Scenario D: auto-learn with ROLLING keeps STM at N-1 after each learn
#[tokio::test]
async fn auto_learn_rolling_keeps_trailing_events() {
    let engine = TestEngine::in_memory("rolling");
    engine
        .update_config(ConfigUpdate {
            max_pattern_length: Some(3),
            stm_mode: Some("ROLLING".into()),
            ..Default::default()
        })
        .await;

    let mut learned = Vec::new();
    for item in ["s1", "s2", "s3", "s4", "s5", "s6", "s7"] {
        let ack = engine
            .manager
            .observe(
                &engine.session_id,
                &Observation {
                    strings: vec![item.to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        if let Some(name) = ack.auto_learned_pattern {
            learned.push(name);
        }
    }

    assert!(learned.len() >= 2, "at least two auto-learns over 7 events");
    let stm = engine.manager.get_stm(&engine.session_id).await.unwrap();
    assert_eq!(stm.len(), 2, "ROLLING leaves max_pattern_length - 1 events");
}

/// max_pattern_length = 0 disables auto-learn regardless of STM length
#[tokio::test]
async fn auto_learn_disabled_at_zero() {
    let engine = TestEngine::in_memory("disabled");
    for i in 0..25 {
        let ack = engine
            .manager
            .observe(
                &engine.session_id,
                &Observation {
                    strings: vec![format!("sym{i}")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(ack.auto_learned_pattern.is_none());
    }
    assert_eq!(engine.manager.get_stm(&engine.session_id).await.unwrap().len(), 25);
}

/// Scenario E: the emotive window holds exactly the last `persistence`
/// entries
#[tokio::test]
async fn emotive_window_truncates_to_persistence() {
    let engine = TestEngine::in_memory("emotive-window");
    for i in 0..7 {
        let label = format!("event{i}");
        engine
            .observe_with_emotives(&[label.as_str()], &[("value", i as f64)])
            .await;
    }
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
        .map(|entry| entry["value"])
        .collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
}

/// Prediction emotives are the per-key mean over the stored window
#[tokio::test]
async fn prediction_emotives_average_the_window() {
    let engine = TestEngine::in_memory("emotive-average");
    engine
        .observe_with_emotives(&["start"], &[("joy", 1.0), ("confidence", 0.8)])
        .await;
    engine
        .observe_with_emotives(&["middle"], &[("joy", 0.5), ("confidence", 0.6)])
        .await;
    engine
        .observe_with_emotives(&["end"], &[("joy", 0.3), ("confidence", 0.4)])
        .await;
    engine.learn().await.unwrap();

    engine.observe_each(&["start", "middle"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    let emotives = &predictions[0].emotives;
    assert!((emotives["joy"] - 0.6).abs() < 0.01);
    assert!((emotives["confidence"] - 0.6).abs() < 0.01);
}

/// recall_threshold = 1.0 still surfaces exact matches (heuristic boundary)
#[tokio::test]
async fn recall_threshold_one_keeps_exact_matches() {
    let engine = TestEngine::in_memory("threshold-one");
    engine
        .update_config(ConfigUpdate {
            recall_threshold: Some(1.0),
            ..Default::default()
        })
        .await;

    engine.observe_each(&["exact", "match"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["exact", "match"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    assert!((predictions[0].similarity - 1.0).abs() < 1e-12);

    // A partial observation scores 0.8 and falls away
    engine.clear_stm().await;
    engine.observe_each(&["exact", "nomatch"]).await;
    assert!(engine.predictions().await.is_empty());
}

/// Config updates survive observe/learn cycles and reject bad values
#[tokio::test]
async fn config_persists_and_validates() {
    let engine = TestEngine::in_memory("config");
    engine
        .update_config(ConfigUpdate {
            recall_threshold: Some(0.5),
            max_pattern_length: Some(5),
            ..Default::default()
        })
        .await;

    engine.observe_each(&["a", "b"]).await;
    engine.learn().await.unwrap();

    let config = engine
        .manager
        .effective_config(&engine.session_id)
        .await
        .unwrap();
    assert_eq!(config.recall_threshold, 0.5);
    assert_eq!(config.max_pattern_length, 5);

    let err = engine
        .manager
        .update_config(
            &engine.session_id,
            &ConfigUpdate {
                persistence: Some(500),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KatoError::Validation(_)));

    // The failed update changed nothing
    let config = engine
        .manager
        .effective_config(&engine.session_id)
        .await
        .unwrap();
    assert_eq!(config.persistence, 5);
}

/// Session TTL expiry surfaces SessionExpired, then SessionNotFound
#[tokio::test]
async fn ttl_expiry_lifecycle() {
    let engine = TestEngine::in_memory("ttl");
    let short_lived = engine
        .manager
        .create_session("ttl-node", Some(0), None)
        .unwrap()
        .session_id;

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(matches!(
        engine.manager.get_stm(&short_lived).await,
        Err(KatoError::SessionExpired(_))
    ));
    assert!(matches!(
        engine.manager.get_stm(&short_lived).await,
        Err(KatoError::SessionNotFound(_))
    ));
}

/// observe-sequence bulk flags drive learn cadence
#[tokio::test]
async fn observe_sequence_flags() {
    let engine = TestEngine::in_memory("bulk");
    let observations: Vec<Observation> = ["b1", "b2", "b3"]
        .iter()
        .map(|s| Observation {
            strings: vec![s.to_string()],
            ..Default::default()
        })
        .collect();

    let outcome = engine
        .manager
        .observe_sequence(&engine.session_id, &observations, false, true, false)
        .await
        .unwrap();
    assert_eq!(outcome.status, "completed");
    assert_eq!(outcome.observations_processed, 3);
    let final_pattern = outcome.final_learned_pattern.expect("learned at end");
    assert!(final_pattern.starts_with("PTRN|"));

    // learn_after_each learns every single-event STM
    let outcome = engine
        .manager
        .observe_sequence(&engine.session_id, &observations, true, false, false)
        .await
        .unwrap();
    assert_eq!(outcome.auto_learned_patterns.len(), 3);
}
