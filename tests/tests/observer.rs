//! Session observation end-to-end: extraction, persistence, and
//! dedup reinforcement.

use chrono::{Duration, Utc};
use elf_core::model::PatternKind;
use elf_core::service::{CallOptions, LogSource};
use elf_core::storage::Store;
use test_utils::{log_line, test_service};

fn options() -> CallOptions {
    CallOptions::default()
}

fn retry_session(session_offset_minutes: i64) -> String {
    let base = Utc::now() - Duration::hours(2) + Duration::minutes(session_offset_minutes);
    [
        log_line(base, "Bash", "cargo test --lib", "failure", Some("error: test failed, timeout")),
        log_line(
            base + Duration::seconds(30),
            "Bash",
            "cargo test --lib -- --nocapture",
            "success",
            None,
        ),
        log_line(base + Duration::seconds(60), "Grep", "fn refresh_token", "success", None),
        log_line(base + Duration::seconds(70), "Read", "src/auth.rs", "success", None),
        log_line(base + Duration::seconds(80), "Read", "src/token.rs", "success", None),
    ]
    .join("\n")
}

#[tokio::test]
async fn observation_extracts_and_persists_patterns() {
    let fixture = test_service().await;

    let summary = fixture
        .service
        .observe_session(
            LogSource::Text(retry_session(0)),
            Some("session-a"),
            None,
            true,
            &options(),
        )
        .await
        .unwrap();

    assert!(summary.patterns_extracted >= 2);
    assert_eq!(summary.patterns_inserted, summary.patterns_extracted);
    assert!(summary.patterns.iter().any(|p| p.kind == PatternKind::Retry));
    assert!(summary.patterns.iter().any(|p| p.kind == PatternKind::Search));

    let stored = fixture.store.list_patterns(None, true).await.unwrap();
    assert_eq!(stored.len(), summary.patterns_extracted);
    for pattern in &stored {
        assert_eq!(pattern.session_ids, vec!["session-a"]);
        assert!(pattern.strength > 0.0 && pattern.strength <= 1.0);
    }
}

#[tokio::test]
async fn repeat_observation_reinforces_instead_of_duplicating() {
    let fixture = test_service().await;

    let first = fixture
        .service
        .observe_session(LogSource::Text(retry_session(0)), Some("s1"), None, true, &options())
        .await
        .unwrap();
    let retry_before = fixture
        .store
        .list_patterns(None, true)
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.kind == PatternKind::Retry)
        .unwrap();

    let second = fixture
        .service
        .observe_session(LogSource::Text(retry_session(5)), Some("s2"), None, true, &options())
        .await
        .unwrap();
    assert_eq!(second.patterns_inserted, 0);
    assert_eq!(second.patterns_reinforced, first.patterns_extracted);

    let retry_after = fixture
        .store
        .get_pattern_by_hash(&retry_before.pattern_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retry_after.occurrence_count, retry_before.occurrence_count + 1);
    assert!(retry_after.strength > retry_before.strength);
    assert_eq!(retry_after.session_ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn observation_from_a_log_file_on_disk() {
    let fixture = test_service().await;
    let log_dir = fixture.config.data_root.join("sessions").join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let log_path = log_dir.join("2026-07-01_session.jsonl");
    std::fs::write(&log_path, retry_session(0)).unwrap();

    let summary = fixture
        .service
        .observe_session(LogSource::Path(log_path), None, Some("/work/api"), true, &options())
        .await
        .unwrap();
    assert!(summary.patterns_extracted >= 1);

    // Session id falls back to the log file stem; location tags the rows
    let stored = fixture.store.list_patterns(Some("/work/api"), true).await.unwrap();
    assert!(!stored.is_empty());
    assert!(stored.iter().all(|p| p.session_ids == vec!["2026-07-01_session"]));
}

#[tokio::test]
async fn dry_observation_persists_nothing() {
    let fixture = test_service().await;
    let summary = fixture
        .service
        .observe_session(LogSource::Text(retry_session(0)), Some("s1"), None, false, &options())
        .await
        .unwrap();
    assert!(summary.patterns_extracted >= 1);
    assert_eq!(summary.patterns_inserted, 0);

    let stored = fixture.store.list_patterns(None, false).await.unwrap();
    assert!(stored.is_empty());
}
