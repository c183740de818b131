//! End-to-end scenarios through the full service stack.

use chrono::{Duration, Utc};
use elf_core::model::{
    AlertState, DomainBaseline, ExtractedPattern, FraudClassification, PatternKind, SourceType,
};
use elf_core::service::CallOptions;
use elf_core::storage::Store;
use test_utils::{heuristic_candidate, test_service, write_golden_rules};

fn options() -> CallOptions {
    CallOptions::default()
}

#[tokio::test]
async fn fresh_install_statistics_are_empty() {
    let fixture = test_service().await;
    let stats = fixture.service.get_statistics(&options()).await.unwrap();

    assert_eq!(stats.total_learnings, 0);
    assert_eq!(stats.total_heuristics, 0);
    assert_eq!(stats.violations_7d, 0);
    assert!(stats.learnings_by_type.is_empty());
    assert!(stats.heuristics_by_domain.is_empty());

    // The call itself must appear exactly once in the audit log, finalized
    let finalized = fixture
        .exec_sql(
            "UPDATE building_queries SET id = id
             WHERE query_type = 'statistics' AND completed_at IS NOT NULL",
        )
        .await;
    assert_eq!(finalized, 1);
}

#[tokio::test]
async fn golden_rule_category_filtering() {
    let fixture = test_service().await;
    write_golden_rules(
        &fixture.config,
        &[("Commit early and often", "git"), ("Validate every input", "core")],
    );

    let filtered = fixture
        .service
        .get_golden_rules(Some(vec!["git".to_string()]), &options())
        .await
        .unwrap();

    assert!(filtered.contains("Commit early and often"));
    assert!(!filtered.contains("Validate every input"));
    assert!(filtered.contains("*[Filtered to categories: git]*"));
}

#[tokio::test]
async fn promotion_path_creates_linked_heuristic_and_golden_section() {
    let fixture = test_service().await;
    write_golden_rules(&fixture.config, &[("Existing manual rule stays", "core")]);

    let pattern = fixture
        .store
        .insert_pattern(
            &ExtractedPattern {
                kind: PatternKind::Retry,
                pattern_text: "When Bash fails, retry with: cargo test --workspace".to_string(),
                signature: "Bash:cargo test".to_string(),
                domain: "rust".to_string(),
                occurrence_count: 5,
                session_ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                project_path: None,
            },
            "feedc0de00000001",
            0.85,
        )
        .await
        .unwrap();

    // Age the pattern past the one-day promotion gate
    fixture
        .exec_sql(&format!(
            "UPDATE patterns SET first_seen = first_seen - {} WHERE id = {}",
            3 * 86_400_000,
            pattern.id
        ))
        .await;

    let summary = fixture
        .service
        .run_distillation(None, true, false, &options())
        .await
        .unwrap();
    assert_eq!(summary.patterns_promoted, 1);

    let heuristic_id = summary.promotions[0].heuristic_id;
    let heuristic = fixture.store.get_heuristic(heuristic_id).await.unwrap().unwrap();
    assert_eq!(heuristic.source_type, Some(SourceType::AutoDistilled));
    assert_eq!(heuristic.source_id, Some(pattern.id));
    assert!((heuristic.confidence - 0.85).abs() < 1e-9);
    assert_eq!(heuristic.times_validated, 5);
    assert!(!heuristic.is_golden);

    let reloaded = fixture
        .store
        .get_pattern_by_hash("feedc0de00000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.promoted_to_heuristic_id, Some(heuristic_id));

    let golden = std::fs::read_to_string(fixture.config.golden_rules_path()).unwrap();
    assert!(golden.contains("# Auto-Distilled Patterns"));
    assert!(golden.contains("When Bash fails, retry with: cargo test --workspace"));
    assert!(golden.contains("Existing manual rule stays"));
}

#[tokio::test]
async fn golden_heuristics_are_whitelisted_from_fraud() {
    let fixture = test_service().await;

    let mut candidate = heuristic_candidate("testing", "Golden rule with perfect record", 0.9);
    candidate.is_golden = true;
    candidate.times_validated = 20;
    let golden = fixture.store.insert_heuristic(&candidate, 0.3, 3).await.unwrap();

    fixture
        .store
        .upsert_domain_baseline(&DomainBaseline {
            domain: "testing".to_string(),
            avg_success_rate: 0.65,
            std_success_rate: 0.05,
            avg_update_frequency: 1.0,
            std_update_frequency: 0.1,
            sample_count: 5,
            last_updated: Utc::now(),
        })
        .await
        .unwrap();

    let report = fixture.service.run_fraud_check(golden.id, &options()).await.unwrap();
    assert!(report.signals.is_empty());
    assert_eq!(report.fraud_score, 0.0);
    assert_eq!(report.classification, FraudClassification::Clean);
}

#[tokio::test]
async fn meta_alert_state_machine_over_declining_confidence() {
    let fixture = test_service().await;
    let meta = fixture.service.meta_observer();
    let now = Utc::now();

    // 8 days flat at 0.75, then 2 days sliding to 0.60
    for hour in 0..(8 * 24) {
        let ts = now - Duration::hours(10 * 24 - hour);
        meta.record_metric_at("avg_confidence", 0.75, ts, None, None).await.unwrap();
    }
    for hour in 0..(2 * 24) {
        let ts = now - Duration::hours(2 * 24 - hour);
        let value = 0.75 - 0.15 * (hour as f64 / 48.0);
        meta.record_metric_at("avg_confidence", value, ts, None, None).await.unwrap();
    }

    let outcome = fixture.service.check_alerts(&options()).await.unwrap();
    assert!(!outcome.bootstrap);
    let decline = outcome
        .alerts
        .iter()
        .find(|a| a.alert_type == "confidence_decline")
        .expect("confidence_decline alert");
    assert_eq!(decline.state, AlertState::New);

    assert!(fixture.service.acknowledge_alert(decline.id, &options()).await.unwrap());
    let acked = fixture.store.get_alert(decline.id).await.unwrap().unwrap();
    assert_eq!(acked.state, AlertState::Ack);

    assert!(fixture.service.resolve_alert(decline.id, &options()).await.unwrap());
    let resolved = fixture.store.get_alert(decline.id).await.unwrap().unwrap();
    assert_eq!(resolved.state, AlertState::Resolved);

    // Resolution frees the dedup key: the same signal creates a new alert
    let outcome = fixture.service.check_alerts(&options()).await.unwrap();
    let fresh = outcome
        .alerts
        .iter()
        .find(|a| a.alert_type == "confidence_decline")
        .expect("fresh confidence_decline alert");
    assert_ne!(fresh.id, decline.id);
    assert_eq!(fresh.state, AlertState::New);
}

#[tokio::test]
async fn bootstrap_mode_on_young_series() {
    let fixture = test_service().await;
    let meta = fixture.service.meta_observer();
    let now = Utc::now();
    for hour in 0..(3 * 24) {
        meta.record_metric_at(
            "avg_confidence",
            0.5,
            now - Duration::hours(3 * 24 - hour),
            None,
            None,
        )
        .await
        .unwrap();
    }

    let outcome = fixture.service.check_alerts(&options()).await.unwrap();
    assert!(outcome.bootstrap);
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].alert_type, "bootstrap");
}

#[tokio::test]
async fn location_scoping_on_domain_queries() {
    let mut fixture = test_service().await;

    let global = heuristic_candidate("auth", "Global heuristic applies anywhere", 0.8);
    fixture.store.insert_heuristic(&global, 0.3, 3).await.unwrap();
    let mut pinned = heuristic_candidate("auth", "Project heuristic applies in x", 0.8);
    pinned.project_path = Some("/x".to_string());
    fixture.store.insert_heuristic(&pinned, 0.3, 3).await.unwrap();

    fixture.service.set_current_location(Some("/x".to_string()));
    let from_x = fixture.service.query_by_domain("auth", 10, &options()).await.unwrap();
    assert_eq!(from_x.heuristic_count, 2);

    fixture.service.set_current_location(Some("/y".to_string()));
    let from_y = fixture.service.query_by_domain("auth", 10, &options()).await.unwrap();
    assert_eq!(from_y.heuristic_count, 1);
    assert_eq!(from_y.heuristics[0].rule, "Global heuristic applies anywhere");
}
