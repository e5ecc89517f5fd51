//! Structural invariants that must hold for every prediction

use kato_core::{ConfigUpdate, pattern_name};
use kato_e2e_tests::{TestEngine, assert_alignment_contract, events};

/// Pattern names are pure functions of the canonical sequence
#[tokio::test]
async fn names_are_deterministic_across_engines() {
    let first = TestEngine::in_memory("det-a");
    first.observe_each(&["alpha", "beta", "gamma"]).await;
    let name_first = first.learn().await.unwrap();

    let second = TestEngine::in_memory("det-b");
    second.observe_each(&["alpha", "beta", "gamma"]).await;
    let name_second = second.learn().await.unwrap();

    assert_eq!(name_first, name_second);
    assert_eq!(
        name_first,
        pattern_name(&events(&[&["alpha"], &["beta"], &["gamma"]]))
    );
}

/// STM shorter than two events yields no predictions
#[tokio::test]
async fn short_stm_yields_empty_predictions() {
    let engine = TestEngine::in_memory("short-stm");
    engine.observe_each(&["one", "two"]).await;
    engine.learn().await.unwrap();

    assert!(engine.predictions().await.is_empty(), "empty STM");

    engine.observe_strings(&engine.session_id, &["one"]).await;
    assert!(engine.predictions().await.is_empty(), "single-event STM");

    engine.observe_strings(&engine.session_id, &["two"]).await;
    assert!(!engine.predictions().await.is_empty(), "two events unlock predictions");
}

/// Empty observations never mutate the STM
#[tokio::test]
async fn empty_observations_are_noops() {
    let engine = TestEngine::in_memory("empty-obs");
    engine.observe_each(&["real"]).await;

    engine
        .manager
        .observe(&engine.session_id, &Default::default())
        .await
        .unwrap();

    let stm = engine.manager.get_stm(&engine.session_id).await.unwrap();
    assert_eq!(stm, events(&[&["real"]]));
}

/// The alignment contract holds across a spread of partial observations
#[tokio::test]
async fn alignment_contract_over_partial_observations() {
    let engine = TestEngine::in_memory("contract");
    engine
        .update_config(ConfigUpdate {
            recall_threshold: Some(0.1),
            ..Default::default()
        })
        .await;

    engine.observe_strings(&engine.session_id, &["a", "b"]).await;
    engine.observe_strings(&engine.session_id, &["c", "d"]).await;
    engine.observe_strings(&engine.session_id, &["e", "f"]).await;
    engine.learn().await.unwrap();

    let probes: Vec<Vec<&str>> = vec![
        vec!["a", "c"],
        vec!["b", "d"],
        vec!["a", "f"],
        vec!["c", "e"],
        vec!["unrelated", "d"],
    ];
    for probe in probes {
        engine.clear_stm().await;
        for symbol in probe.iter().copied() {
            engine.observe_strings(&engine.session_id, &[symbol]).await;
        }
        for prediction in engine.predictions().await {
            assert_alignment_contract(&prediction, probe.len());
        }
    }
}

/// clear_stm followed by identical observations reproduces byte-identical
/// predictions for the same KB state
#[tokio::test]
async fn predictions_are_reproducible_for_unchanged_kb() {
    let engine = TestEngine::in_memory("reproducible");
    engine.observe_each(&["x", "y", "z"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["x", "y"]).await;
    let first = engine.predictions().await;

    engine.clear_stm().await;
    engine.observe_each(&["x", "y"]).await;
    let second = engine.predictions().await;

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

/// Every prediction carries the full metric set with sane ranges
#[tokio::test]
async fn metric_fields_present_and_bounded() {
    let engine = TestEngine::in_memory("metrics");
    engine
        .update_config(ConfigUpdate {
            recall_threshold: Some(0.2),
            ..Default::default()
        })
        .await;
    engine.observe_each(&["all", "metrics", "test"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["all", "metrics"]).await;
    let predictions = engine.predictions().await;
    assert!(!predictions.is_empty());

    for p in &predictions {
        let json = serde_json::to_value(p).unwrap();
        for field in [
            "bayesian_posterior",
            "bayesian_prior",
            "bayesian_likelihood",
            "tfidf_score",
            "frequency",
            "similarity",
            "potential",
            "entropy",
            "normalized_entropy",
            "global_normalized_entropy",
            "evidence",
            "confidence",
            "snr",
            "fragmentation",
            "predictive_information",
        ] {
            assert!(json.get(field).is_some(), "missing metric {field}");
        }

        assert!((0.0..=1.0).contains(&p.similarity));
        assert!((0.0..=1.0).contains(&p.confidence));
        assert!((0.0..=1.0).contains(&p.snr));
        assert!((0.0..=1.0).contains(&p.evidence));
        assert!((0.0..=1.0).contains(&p.fragmentation));
        assert!((0.0..=1.0).contains(&p.bayesian_posterior));
        assert!(p.tfidf_score >= 0.0);
        assert!(p.entropy >= 0.0);
        assert!(p.frequency >= 1);
    }
}

/// Frozen metric values for a fixed KB and observation
#[tokio::test]
async fn metric_values_frozen_corpus() {
    let engine = TestEngine::in_memory("frozen");
    engine.observe_each(&["hello", "world", "test"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["hello", "world"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 1);
    let p = &predictions[0];

    // obs [hello, world] vs pattern [hello, world, test]
    assert!((p.similarity - 0.8).abs() < 1e-12);
    // 2 matches over 2 present symbols
    assert!((p.confidence - 1.0).abs() < 1e-12);
    // 2 matches over 3 pattern symbols
    assert!((p.evidence - 2.0 / 3.0).abs() < 1e-12);
    // no extras
    assert!((p.snr - 1.0).abs() < 1e-12);
    // one contiguous match block
    assert_eq!(p.fragmentation, 0.0);
    // single-symbol future distribution
    assert_eq!(p.entropy, 0.0);
    assert_eq!(p.normalized_entropy, 0.0);
    assert!((p.potential - 0.8).abs() < 1e-12);
    // one symbol in the future over three pattern symbols, times similarity
    assert!((p.predictive_information - (1.0 / 3.0) * 0.8).abs() < 1e-12);
    // only pattern in the KB: prior 1, posterior 1
    assert!((p.bayesian_prior - 1.0).abs() < 1e-12);
    assert!((p.bayesian_likelihood - 0.8).abs() < 1e-12);
    assert!((p.bayesian_posterior - 1.0).abs() < 1e-12);
    // idf = ln(1/1) = 0 for every symbol in a single-pattern KB
    assert_eq!(p.tfidf_score, 0.0);
}

/// Rank ordering follows the configured sort key, descending
#[tokio::test]
async fn ranking_respects_configured_key() {
    let engine = TestEngine::in_memory("ranking");
    engine
        .update_config(ConfigUpdate {
            recall_threshold: Some(0.1),
            rank_sort_algo: Some("similarity".into()),
            ..Default::default()
        })
        .await;

    engine.observe_each(&["q", "r"]).await;
    engine.learn().await.unwrap();
    engine.observe_each(&["q", "r", "s", "t"]).await;
    engine.learn().await.unwrap();

    engine.observe_each(&["q", "r"]).await;
    let predictions = engine.predictions().await;
    assert_eq!(predictions.len(), 2);
    assert!(predictions[0].similarity >= predictions[1].similarity);
}
