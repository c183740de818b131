//! Concurrency properties: ordered confidence chains and non-interfering
//! engine runs.

use chrono::{Duration, Utc};
use elf_core::model::UpdateType;
use elf_core::service::CallOptions;
use elf_core::storage::Store;
use futures::future::join_all;
use test_utils::{heuristic_candidate, test_service, write_golden_rules};

fn options() -> CallOptions {
    CallOptions::default()
}

#[tokio::test]
async fn parallel_updates_form_a_consistent_chain() {
    let fixture = test_service().await;
    let heuristic = fixture
        .store
        .insert_heuristic(&heuristic_candidate("testing", "Run tests before pushing", 0.5), 0.3, 0)
        .await
        .unwrap();
    let initial = heuristic.confidence;

    // Mixed events so the chain moves in both directions; failures are
    // never rate-limited, successes may be
    let events = [
        UpdateType::Success,
        UpdateType::Failure,
        UpdateType::Failure,
        UpdateType::Success,
        UpdateType::Contradiction,
        UpdateType::Failure,
    ];
    let opts = options();
    let futures: Vec<_> = events
        .iter()
        .map(|event| fixture.service.update_confidence(heuristic.id, *event, None, &opts))
        .collect();
    let results = join_all(futures).await;
    for result in &results {
        assert!(result.is_ok(), "update failed: {result:?}");
    }

    let final_state = fixture.store.get_heuristic(heuristic.id).await.unwrap().unwrap();
    let updates = fixture
        .store
        .list_confidence_updates(heuristic.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(updates.len(), events.len());

    // Totally ordered chain: each update starts where the previous ended
    for pair in updates.windows(2) {
        assert!(
            (pair[1].old_confidence - pair[0].new_confidence).abs() < 1e-9,
            "chain is broken between updates {} and {}",
            pair[0].id,
            pair[1].id
        );
    }

    // Deltas sum to final - initial
    let delta_sum: f64 = updates.iter().map(|u| u.delta).sum();
    assert!((delta_sum - (final_state.confidence - initial)).abs() < 1e-9);

    // Every delta reconciles with its own endpoints
    for update in &updates {
        assert!(
            ((update.new_confidence - update.old_confidence) - update.delta).abs() < 1e-9
        );
    }

    // Counters moved once per event
    assert_eq!(final_state.times_validated, 2);
    assert_eq!(final_state.times_violated, 3);
    assert_eq!(final_state.times_contradicted, 1);
}

#[tokio::test]
async fn fraud_sweep_and_context_build_run_concurrently() {
    let fixture = test_service().await;
    write_golden_rules(&fixture.config, &[("Keep functions small", "core")]);

    for i in 0..8 {
        let mut candidate = heuristic_candidate(
            "testing",
            &format!("Independent testing rule number {i}"),
            0.6,
        );
        candidate.times_validated = 12;
        fixture.store.insert_heuristic(&candidate, 0.3, 0).await.unwrap();
    }
    // Domain defaults would reject 8 rules; widen the caps for this test
    fixture
        .exec_sql("UPDATE domain_metadata SET soft_limit = 10, hard_limit = 20 WHERE domain = 'testing'")
        .await;

    for learning in [
        test_utils::learning_fixture("testing", "Flaky retry loop", "flaky,retry"),
        test_utils::learning_fixture("testing", "Slow suite timeout", "timeout"),
    ] {
        fixture.service.record_learning(learning, &options()).await.unwrap();
    }

    let opts = options();
    let sweep = fixture.service.fraud_detector().sweep(50);
    let context = fixture.service.build_context(
        "Stabilize the flaky integration tests",
        Some("testing"),
        None,
        5000,
        &opts,
    );

    let (sweep_result, context_result) = tokio::join!(sweep, context);
    let reports = sweep_result.unwrap();
    assert_eq!(reports.len(), 8);
    let packet = context_result.unwrap();
    assert!(packet.contains("TIER 1: Golden Rules"));
    assert!(packet.contains("Independent testing rule"));

    // Sweep stamped every candidate; a second sweep finds nothing stale
    let again = fixture.service.fraud_detector().sweep(50).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn same_day_successes_rate_limit_but_keep_counting() {
    let fixture = test_service().await;
    let heuristic = fixture
        .store
        .insert_heuristic(&heuristic_candidate("testing", "Pin dependency versions", 0.5), 0.3, 0)
        .await
        .unwrap();

    let first = fixture
        .service
        .update_confidence(heuristic.id, UpdateType::Success, None, &options())
        .await
        .unwrap();
    assert!(!first.rate_limited);
    assert!(first.delta > 0.0);

    let second = fixture
        .service
        .update_confidence(heuristic.id, UpdateType::Success, None, &options())
        .await
        .unwrap();
    assert!(second.rate_limited);
    assert_eq!(second.delta, 0.0);

    let state = fixture.store.get_heuristic(heuristic.id).await.unwrap().unwrap();
    assert_eq!(state.times_validated, 2);
    assert_eq!(state.update_count_today, 2);
}
