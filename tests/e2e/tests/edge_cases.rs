//! Edge cases: unusual symbols, multisets, long sequences, mixed inputs

use kato_core::Observation;
use kato_e2e_tests::{TestEngine, events};

/// Unicode symbols survive canonicalization, hashing, and alignment
#[tokio::test]
async fn unicode_symbols_roundtrip() {
    let engine = TestEngine::in_memory("unicode");
    engine.observe_each(&["café", "日本語", "🚀"]).await;
    let name = engine.learn().await.unwrap();

    engine.observe_each(&["café", "日本語"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].name, name);
    assert_eq!(predictions[0].future, events(&[&["🚀"]]));
}

/// Duplicate symbols within an event are multiset members, and change the
/// pattern identity
#[tokio::test]
async fn duplicate_symbols_are_multiset_members() {
    let engine = TestEngine::in_memory("multiset");
    engine.observe_strings(&engine.session_id, &["echo", "echo"]).await;
    engine.observe_strings(&engine.session_id, &["tail"]).await;
    let doubled = engine.learn().await.unwrap();

    engine.observe_strings(&engine.session_id, &["echo"]).await;
    engine.observe_strings(&engine.session_id, &["tail"]).await;
    let single = engine.learn().await.unwrap();

    assert_ne!(doubled, single, "multiplicity is part of the identity");

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &doubled)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.pattern_data[0], vec!["echo", "echo"]);
    assert_eq!(record.length, 3);
    assert_eq!(record.token_set, vec!["echo", "tail"]);
}

/// A long sequence learns and predicts from a mid-stream window
#[tokio::test]
async fn long_sequence_mid_stream_prediction() {
    let engine = TestEngine::in_memory("long-seq");
    let symbols: Vec<String> = (0..50).map(|i| format!("step{i:02}")).collect();
    for symbol in &symbols {
        engine.observe_strings(&engine.session_id, &[symbol]).await;
    }
    engine.learn().await.unwrap();

    // Observe a window from the middle
    for symbol in &symbols[20..24] {
        engine.observe_strings(&engine.session_id, &[symbol]).await;
    }
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    let p = &predictions[0];
    assert_eq!(p.past.len(), 20);
    assert_eq!(p.present.len(), 4);
    assert_eq!(p.future.len(), 26);
    assert_eq!(p.future[0], vec!["step24"]);
}

/// Mixed string and vector observations share one event
#[tokio::test]
async fn mixed_string_vector_event() {
    let engine = TestEngine::in_memory("mixed");
    let mut obs = Observation {
        strings: vec!["label".into()],
        ..Default::default()
    };
    obs.vectors = vec![vec![0.1, 0.2, 0.3]];
    engine.manager.observe(&engine.session_id, &obs).await.unwrap();

    let stm = engine.manager.get_stm(&engine.session_id).await.unwrap();
    assert_eq!(stm.len(), 1);
    assert_eq!(stm[0].len(), 2);
    assert!(stm[0].iter().any(|s| s == "label"));
    assert!(stm[0].iter().any(|s| s.starts_with("VCTR|")));
}

/// The same sequence learned under two tenants keeps separate frequencies
#[tokio::test]
async fn per_tenant_frequency_accounting() {
    let engine = TestEngine::in_memory("tenant-x");
    let other = engine.open_session("tenant-y");

    for _ in 0..3 {
        engine.observe_each(&["common", "sequence"]).await;
        engine.learn().await.unwrap();
    }
    for item in ["common", "sequence"] {
        engine.observe_strings(&other, &[item]).await;
    }
    let name = engine.manager.learn(&other).await.unwrap().unwrap();

    let mine = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    let theirs = engine
        .manager
        .pattern_record_for_session(&other, &name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mine.frequency, 3);
    assert_eq!(theirs.frequency, 1);
}

/// Unknown pattern names resolve to nothing rather than an error
#[tokio::test]
async fn unknown_pattern_name_is_absent() {
    let engine = TestEngine::in_memory("unknown");
    let record = engine
        .manager
        .pattern_record_for_session(
            &engine.session_id,
            "PTRN|0000000000000000000000000000000000000000",
        )
        .await
        .unwrap();
    assert!(record.is_none());
}

/// Whitespace and empty-string symbols are carried verbatim
#[tokio::test]
async fn odd_string_symbols_are_opaque() {
    let engine = TestEngine::in_memory("odd-strings");
    engine
        .observe_strings(&engine.session_id, &["  padded  ", "with space"])
        .await;
    engine.observe_strings(&engine.session_id, &["tail"]).await;
    let name = engine.learn().await.unwrap();

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &name)
        .await
        .unwrap()
        .unwrap();
    assert!(record.pattern_data[0].contains(&"  padded  ".to_string()));
    assert!(record.pattern_data[0].contains(&"with space".to_string()));
}

/// Sessions on nodes whose ids need sanitization still work end to end
#[tokio::test]
async fn node_id_sanitization_end_to_end() {
    let engine = TestEngine::in_memory("user@example.com/prod");
    engine.observe_each(&["sanitized", "tenant", "works"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["sanitized", "tenant"]).await;
    assert_eq!(engine.predictions().await.len(), 1);

    // Another session with the same raw id shares the KB
    let sibling = engine.open_session("user@example.com/prod");
    for item in ["sanitized", "tenant"] {
        engine.observe_strings(&sibling, &[item]).await;
    }
    assert_eq!(
        engine.manager.get_predictions(&sibling).await.unwrap().len(),
        1
    );
}
