//! Idempotence and round-trip properties.

use chrono::{Duration, Utc};
use elf_core::model::{ExtractedPattern, PatternKind};
use elf_core::service::CallOptions;
use elf_core::storage::Store;
use elf_core::Error;
use test_utils::{test_service, write_golden_rules};

fn options() -> CallOptions {
    CallOptions::default()
}

async fn insert_promotable_pattern(fixture: &test_utils::TestService, hash: &str) -> i64 {
    let pattern = fixture
        .store
        .insert_pattern(
            &ExtractedPattern {
                kind: PatternKind::Error,
                pattern_text: format!("Common error with Bash: timeout ({hash})"),
                signature: format!("error:timeout:{hash}"),
                domain: "shell".to_string(),
                occurrence_count: 4,
                session_ids: vec!["a".to_string(), "b".to_string()],
                project_path: None,
            },
            hash,
            0.8,
        )
        .await
        .unwrap();
    fixture
        .exec_sql(&format!(
            "UPDATE patterns SET first_seen = first_seen - {} WHERE id = {}",
            2 * 86_400_000,
            pattern.id
        ))
        .await;
    pattern.id
}

#[tokio::test]
async fn distillation_twice_is_a_noop_the_second_time() {
    let fixture = test_service().await;
    write_golden_rules(&fixture.config, &[("Manual rule", "core")]);
    insert_promotable_pattern(&fixture, "1dempotent000001").await;

    let first = fixture.service.run_distillation(None, true, false, &options()).await.unwrap();
    assert_eq!(first.patterns_promoted, 1);
    let heuristics_after_first =
        fixture.service.get_statistics(&options()).await.unwrap().total_heuristics;
    let golden_after_first =
        std::fs::read_to_string(fixture.config.golden_rules_path()).unwrap();

    let second = fixture.service.run_distillation(None, true, false, &options()).await.unwrap();
    assert_eq!(second.patterns_promoted, 0);
    assert_eq!(second.candidates_found, 0);
    let heuristics_after_second =
        fixture.service.get_statistics(&options()).await.unwrap().total_heuristics;
    let golden_after_second =
        std::fs::read_to_string(fixture.config.golden_rules_path()).unwrap();

    assert_eq!(heuristics_after_first, heuristics_after_second);
    assert_eq!(golden_after_first, golden_after_second);
}

#[tokio::test]
async fn decay_composes_multiplicatively() {
    let fixture = test_service().await;
    let pattern = fixture
        .store
        .insert_pattern(
            &ExtractedPattern {
                kind: PatternKind::Search,
                pattern_text: "Search 'handler' leads to reading 3 files".to_string(),
                signature: "search:handler:3".to_string(),
                domain: "search".to_string(),
                occurrence_count: 1,
                session_ids: vec!["a".to_string()],
                project_path: None,
            },
            "decaydecay000001",
            0.8,
        )
        .await
        .unwrap();
    // Last seen one half-life ago
    fixture
        .exec_sql(&format!(
            "UPDATE patterns SET last_seen = last_seen - {} WHERE id = {}",
            7 * 86_400_000,
            pattern.id
        ))
        .await;

    let distiller = fixture.service.distiller();
    distiller.apply_decay(None).await.unwrap();
    let after_one = fixture
        .store
        .get_pattern_by_hash("decaydecay000001")
        .await
        .unwrap()
        .unwrap()
        .strength;
    assert!((after_one - 0.4).abs() < 0.01);

    distiller.apply_decay(None).await.unwrap();
    let after_two = fixture
        .store
        .get_pattern_by_hash("decaydecay000001")
        .await
        .unwrap()
        .unwrap()
        .strength;
    // 0.8 * 0.5^(2 * 7 / 7) within tolerance
    assert!((after_two - 0.2).abs() < 0.01);
}

#[tokio::test]
async fn decay_floors_at_the_minimum_without_deleting() {
    let fixture = test_service().await;
    let pattern = fixture
        .store
        .insert_pattern(
            &ExtractedPattern {
                kind: PatternKind::ToolSequence,
                pattern_text: "Common sequence: Grep→Read (6 times)".to_string(),
                signature: "tool_seq:Grep→Read".to_string(),
                domain: "workflow".to_string(),
                occurrence_count: 6,
                session_ids: vec!["a".to_string()],
                project_path: None,
            },
            "floooooor0000001",
            0.05,
        )
        .await
        .unwrap();
    fixture
        .exec_sql(&format!(
            "UPDATE patterns SET last_seen = last_seen - {} WHERE id = {}",
            70i64 * 86_400_000,
            pattern.id
        ))
        .await;

    fixture.service.distiller().apply_decay(None).await.unwrap();
    let decayed = fixture
        .store
        .get_pattern_by_hash("floooooor0000001")
        .await
        .unwrap()
        .unwrap();
    assert!((decayed.strength - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn duplicate_metric_observation_is_rejected() {
    let fixture = test_service().await;
    let meta = fixture.service.meta_observer();
    let ts = Utc::now();

    meta.record_metric_at("avg_confidence", 0.7, ts, None, None).await.unwrap();
    let err = meta
        .record_metric_at("avg_confidence", 0.8, ts, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));
    assert_eq!(err.code().as_str(), "QS002");

    // Distinct domain at the same instant is a different series
    meta.record_metric_at("avg_confidence", 0.8, ts, Some("auth"), None).await.unwrap();
}

#[tokio::test]
async fn golden_rules_are_cached_until_the_file_changes() {
    let fixture = test_service().await;
    write_golden_rules(&fixture.config, &[("Original rule", "core")]);

    let first = fixture.service.get_golden_rules(None, &options()).await.unwrap();
    assert!(first.contains("Original rule"));

    // Rewrite with a bumped mtime; the cache must serve the new content
    write_golden_rules(&fixture.config, &[("Replacement rule", "core")]);
    let path = fixture.config.golden_rules_path();
    let file = std::fs::File::options().append(true).open(&path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5)).unwrap();
    drop(file);

    let second = fixture.service.get_golden_rules(None, &options()).await.unwrap();
    assert!(second.contains("Replacement rule"));
}

#[tokio::test]
async fn session_contexts_purge_after_retention() {
    let fixture = test_service().await;
    fixture
        .service
        .record_session_context("s1", "the context text", &[1, 2, 3], &options())
        .await
        .unwrap();
    // Age the row past the 7-day retention
    fixture
        .exec_sql(&format!(
            "UPDATE session_contexts SET created_at = created_at - {}",
            8 * 86_400_000
        ))
        .await;

    let purged = fixture.service.fraud_detector().cleanup_contexts().await.unwrap();
    assert_eq!(purged, 1);
}

#[tokio::test]
async fn learning_with_matching_tag_revives_dormant_heuristic() {
    let fixture = test_service().await;
    let mut candidate =
        test_utils::heuristic_candidate("auth", "Check token expiry before use", 0.15);
    candidate.times_validated = 0;
    let heuristic = fixture.store.insert_heuristic(&candidate, 0.3, 3).await.unwrap();

    // Force dormancy with declared revival conditions
    fixture
        .exec_sql(&format!(
            "UPDATE heuristics SET status = 'dormant', revival_conditions = 'token-expiry,auth'
             WHERE id = {}",
            heuristic.id
        ))
        .await;

    let learning = test_utils::learning_fixture("auth", "Expiry bug resurfaced", "token-expiry");
    fixture.service.record_learning(learning, &options()).await.unwrap();

    let revived = fixture.store.get_heuristic(heuristic.id).await.unwrap().unwrap();
    assert_eq!(revived.status, elf_core::HeuristicStatus::Active);
    assert_eq!(revived.times_revived, 1);

    let updates = fixture
        .store
        .list_confidence_updates(heuristic.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert!(updates
        .iter()
        .any(|u| u.update_type == elf_core::UpdateType::Revival && u.delta == 0.0));
}
