//! Multi-tenant isolation and cross-session sharing

use kato_e2e_tests::TestEngine;

/// Scenario C: sessions on distinct nodes are mutually invisible
#[tokio::test]
async fn distinct_nodes_see_disjoint_knowledge() {
    let engine = TestEngine::in_memory("tenant-one");
    let other = engine.open_session("tenant-two");

    // Tenant one learns its sequence
    engine.observe_each(&["one-a", "one-b", "one-c"]).await;
    engine.learn().await.unwrap();

    // Tenant two learns a disjoint sequence
    for item in ["two-a", "two-b", "two-c"] {
        engine.observe_strings(&other, &[item]).await;
    }
    engine.manager.learn(&other).await.unwrap();

    // Each STM holds only its own data
    let stm_one = engine.manager.get_stm(&engine.session_id).await.unwrap();
    let stm_two = engine.manager.get_stm(&other).await.unwrap();
    assert!(stm_one.is_empty());
    assert!(stm_two.is_empty());

    // Observing the other tenant's prefix finds nothing
    engine.observe_each(&["two-a", "two-b"]).await;
    assert!(engine.predictions().await.is_empty());

    engine.observe_strings(&other, &["one-a"]).await;
    engine.observe_strings(&other, &["one-b"]).await;
    assert!(engine.manager.get_predictions(&other).await.unwrap().is_empty());
}

/// Sessions with the same node id share patterns but not STM
#[tokio::test]
async fn same_node_sessions_share_patterns() {
    let engine = TestEngine::in_memory("shared-node");
    let sibling = engine.open_session("shared-node");

    engine.observe_each(&["learn", "together", "now"]).await;
    engine.learn().await.unwrap();

    // The sibling session sees the learned pattern immediately
    engine.observe_strings(&sibling, &["learn"]).await;
    engine.observe_strings(&sibling, &["together"]).await;
    let predictions = engine.manager.get_predictions(&sibling).await.unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].future, vec![vec!["now".to_string()]]);

    // But its STM stays independent
    assert!(engine.manager.get_stm(&engine.session_id).await.unwrap().is_empty());
    assert_eq!(engine.manager.get_stm(&sibling).await.unwrap().len(), 2);
}

/// Clearing one tenant's KB leaves other tenants untouched
#[tokio::test]
async fn clear_kb_is_tenant_scoped() {
    let engine = TestEngine::in_memory("keeper");
    let doomed = engine.open_session("doomed");

    engine.observe_each(&["keep", "this"]).await;
    let kept = engine.learn().await.unwrap();

    engine.observe_strings(&doomed, &["drop"]).await;
    engine.observe_strings(&doomed, &["this"]).await;
    engine.manager.learn(&doomed).await.unwrap();

    engine.manager.clear_all_memory(&doomed).await.unwrap();

    // The keeper's pattern survives
    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &kept)
        .await
        .unwrap();
    assert!(record.is_some());

    // The doomed tenant's KB is empty
    engine.observe_strings(&doomed, &["drop"]).await;
    engine.observe_strings(&doomed, &["this"]).await;
    assert!(engine.manager.get_predictions(&doomed).await.unwrap().is_empty());
}

/// Concurrent observes on different sessions proceed without interference
#[tokio::test]
async fn concurrent_sessions_keep_fifo_per_session() {
    let engine = TestEngine::in_memory("concurrent-a");
    let other = engine.open_session("concurrent-b");

    let manager = engine.manager.clone();
    let session_a = engine.session_id.clone();
    let session_b = other.clone();

    let task_a = tokio::spawn({
        let manager = manager.clone();
        async move {
            for i in 0..20 {
                let obs = kato_core::Observation {
                    strings: vec![format!("a{i}")],
                    ..Default::default()
                };
                manager.observe(&session_a, &obs).await.unwrap();
            }
        }
    });
    let task_b = tokio::spawn({
        let manager = manager.clone();
        async move {
            for i in 0..20 {
                let obs = kato_core::Observation {
                    strings: vec![format!("b{i}")],
                    ..Default::default()
                };
                manager.observe(&session_b, &obs).await.unwrap();
            }
        }
    });
    task_a.await.unwrap();
    task_b.await.unwrap();

    // Each STM holds exactly its own 20 events, in submission order
    let stm_a = engine.manager.get_stm(&engine.session_id).await.unwrap();
    let stm_b = engine.manager.get_stm(&other).await.unwrap();
    assert_eq!(stm_a.len(), 20);
    assert_eq!(stm_b.len(), 20);
    for (i, event) in stm_a.iter().enumerate() {
        assert_eq!(event, &vec![format!("a{i}")]);
    }
    for (i, event) in stm_b.iter().enumerate() {
        assert_eq!(event, &vec![format!("b{i}")]);
    }
}

/// Duplicate concurrent learns of one canonical sequence collapse to a
/// single body with one frequency increment per learn event
#[tokio::test]
async fn concurrent_learns_collapse_to_one_pattern() {
    let engine = TestEngine::in_memory("collapse");
    let mut handles = Vec::new();
    for _ in 0..4 {
        let session_id = engine.open_session("collapse");
        let manager = engine.manager.clone();
        handles.push(tokio::spawn(async move {
            for item in ["same", "sequence"] {
                let obs = kato_core::Observation {
                    strings: vec![item.to_string()],
                    ..Default::default()
                };
                manager.observe(&session_id, &obs).await.unwrap();
            }
            manager.learn(&session_id).await.unwrap().unwrap()
        }));
    }

    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.await.unwrap());
    }
    names.dedup();
    assert_eq!(names.len(), 1, "all learns resolve to one name");

    let record = engine
        .manager
        .pattern_record_for_session(&engine.session_id, &names[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.frequency, 4);
}
