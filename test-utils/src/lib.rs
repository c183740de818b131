//! Shared fixtures for knowledge-core tests: file-backed services, entity
//! factories, and session-log builders.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

use chrono::{DateTime, Utc};
use elf_core::config::ElfConfig;
use elf_core::model::{LearningType, NewHeuristic, NewLearning, SourceType};
use elf_core::service::ElfService;
use elf_core::storage::Store;
use elf_storage::ElfStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A service over a file-backed store in a scratch data root. Keep the
/// value alive for the duration of the test; the temp dir is removed on
/// drop.
pub struct TestService {
    pub service: ElfService,
    pub store: Arc<dyn Store>,
    pub config: ElfConfig,
    pub db_path: PathBuf,
    _data_root: TempDir,
}

impl TestService {
    /// Run raw SQL against the test database (aging rows, corrupting state
    /// on purpose). Test-side only; production code never does this.
    pub async fn exec_sql(&self, sql: &str) -> u64 {
        let db = libsql::Builder::new_local(&self.db_path)
            .build()
            .await
            .expect("open test db");
        let conn = db.connect().expect("connect test db");
        conn.execute(sql, ()).await.expect("test sql")
    }
}

/// Build a service backed by a file database under a temp data root.
pub async fn test_service() -> TestService {
    let data_root = tempfile::tempdir().expect("tempdir");
    let config = ElfConfig {
        data_root: data_root.path().to_path_buf(),
        ..ElfConfig::default()
    };
    std::fs::create_dir_all(config.memory_dir()).expect("memory dir");
    let db_path = config.db_path();

    let storage: Arc<dyn Store> =
        Arc::new(ElfStorage::open(&db_path).await.expect("open store"));
    let service = ElfService::new(config.clone(), storage.clone());
    TestService { service, store: storage, config, db_path, _data_root: data_root }
}

/// A plain heuristic candidate for `domain` with a distinct rule.
pub fn heuristic_candidate(domain: &str, rule: &str, confidence: f64) -> NewHeuristic {
    NewHeuristic {
        domain: domain.to_string(),
        rule: rule.to_string(),
        explanation: Some("Fixture explanation for why this rule works.".to_string()),
        source_type: SourceType::Observation,
        source_id: None,
        confidence,
        times_validated: 0,
        is_golden: false,
        project_path: None,
    }
}

/// A learning fixture with a unique filepath derived from the title.
pub fn learning_fixture(domain: &str, title: &str, tags: &str) -> NewLearning {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    NewLearning {
        learning_type: LearningType::Failure,
        filepath: format!("failures/{slug}.md"),
        title: title.to_string(),
        summary: Some(format!("{title} write-up")),
        tags: Some(tags.to_string()),
        domain: Some(domain.to_string()),
        severity: 3,
    }
}

/// One session-log line in the documented record format.
pub fn log_line(
    ts: DateTime<Utc>,
    tool: &str,
    input: &str,
    outcome: &str,
    output: Option<&str>,
) -> String {
    let mut record = serde_json::json!({
        "ts": ts.to_rfc3339(),
        "type": "tool_use",
        "tool": tool,
        "input_summary": input,
        "outcome": outcome,
    });
    if let Some(output) = output {
        record["output_summary"] = serde_json::Value::String(output.to_string());
    }
    record.to_string()
}

/// Write a golden-rules file with category-tagged rules into the memory dir.
pub fn write_golden_rules(config: &ElfConfig, rules: &[(&str, &str)]) {
    let mut content = String::from("# Golden Rules\n\nCurated rules.\n\n");
    for (i, (rule, category)) in rules.iter().enumerate() {
        content.push_str(&format!(
            "## {}. {rule}\n> {rule}\n**Category:** {category}\n\n",
            i + 1
        ));
    }
    std::fs::create_dir_all(config.memory_dir()).expect("memory dir");
    std::fs::write(config.golden_rules_path(), content).expect("write golden rules");
}
