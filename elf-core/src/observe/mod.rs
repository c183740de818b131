//! # Observer
//!
//! Extracts actionable patterns from session logs:
//! - Retry patterns: the same tool called again shortly after a failure
//! - Error patterns: recurring error signatures
//! - Search patterns: Grep/Glob followed by Read sequences
//! - Success sequences: tool chains that lead to commits
//! - Tool sequences: common adjacent tool pairs
//!
//! Extracted patterns are deduplicated against the store by hash; repeats
//! reinforce the existing row instead of inserting a new one.

mod extract;

pub use extract::{normalize_input, PatternExtractor};

use crate::error::Result;
use crate::model::ExtractedPattern;
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of one tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

/// One `tool_use` record from a session log, sorted by timestamp before
/// extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub ts: DateTime<Utc>,
    pub tool: String,
    pub input_summary: String,
    pub output_summary: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    ts: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    tool: Option<String>,
    input_summary: Option<String>,
    output_summary: Option<String>,
    outcome: Option<String>,
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse line-delimited session-log content into sorted `tool_use` events.
/// Malformed lines are skipped with a warning; unknown fields are ignored.
pub fn parse_session_log(content: &str) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed session-log line");
                continue;
            }
        };
        if record.record_type.as_deref() != Some("tool_use") {
            continue;
        }
        let Some(ts) = record.ts.as_deref().and_then(parse_timestamp) else {
            warn!(line = line_no + 1, "Skipping tool_use record without a parseable timestamp");
            continue;
        };
        let outcome = match record.outcome.as_deref() {
            Some("success") => Outcome::Success,
            Some("failure") => Outcome::Failure,
            _ => Outcome::Unknown,
        };
        events.push(SessionEvent {
            ts,
            tool: record.tool.unwrap_or_default(),
            input_summary: record.input_summary.unwrap_or_default(),
            output_summary: record.output_summary,
            outcome,
        });
    }
    events.sort_by_key(|e| e.ts);
    events
}

/// Summary of one observation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub patterns_extracted: usize,
    pub patterns_inserted: usize,
    pub patterns_reinforced: usize,
    pub patterns: Vec<ExtractedPattern>,
}

/// Observer: parses logs, extracts patterns, and upserts them with
/// dedup-hash reinforcement. The only component that writes pattern rows.
pub struct Observer<S> {
    store: S,
}

impl<S: AsRef<dyn Store>> Observer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Observe a session log file on disk.
    pub async fn observe_file(
        &self,
        log_path: &Path,
        session_id: Option<&str>,
        project_path: Option<&str>,
        persist: bool,
    ) -> Result<ObservationSummary> {
        let content = tokio::fs::read_to_string(log_path).await?;
        let session_id = session_id
            .map(str::to_string)
            .or_else(|| {
                log_path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string)
            })
            .unwrap_or_else(|| Utc::now().format("%Y%m%d_%H%M%S").to_string());
        self.observe_text(&content, &session_id, project_path, persist).await
    }

    /// Observe inline log content.
    pub async fn observe_text(
        &self,
        content: &str,
        session_id: &str,
        project_path: Option<&str>,
        persist: bool,
    ) -> Result<ObservationSummary> {
        let events = parse_session_log(content);
        if events.is_empty() {
            return Ok(ObservationSummary::default());
        }

        let extractor = PatternExtractor::new(events, session_id, project_path);
        let patterns = extractor.extract_all();
        debug!(count = patterns.len(), session_id, "Extracted patterns from session log");

        let mut summary = ObservationSummary {
            patterns_extracted: patterns.len(),
            ..ObservationSummary::default()
        };

        if persist {
            for pattern in &patterns {
                if self.upsert_pattern(pattern).await? {
                    summary.patterns_inserted += 1;
                } else {
                    summary.patterns_reinforced += 1;
                }
            }
        }
        summary.patterns = patterns;
        Ok(summary)
    }

    /// Insert or reinforce one extracted pattern. Returns true when a new
    /// row was created.
    async fn upsert_pattern(&self, pattern: &ExtractedPattern) -> Result<bool> {
        let store = self.store.as_ref();
        let hash = pattern.dedup_hash();

        if let Some(existing) = store.get_pattern_by_hash(&hash).await? {
            let strength = (existing.strength + 0.05).min(1.0);
            let mut sessions = existing.session_ids.clone();
            for id in &pattern.session_ids {
                if !sessions.contains(id) {
                    sessions.push(id.clone());
                }
            }
            let keep_from = sessions.len().saturating_sub(10);
            let sessions = sessions.split_off(keep_from);
            store
                .reinforce_pattern(
                    existing.id,
                    pattern.occurrence_count.max(1),
                    strength,
                    &sessions,
                    Utc::now(),
                )
                .await?;
            Ok(false)
        } else {
            store.insert_pattern(pattern, &hash, pattern.initial_strength()).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts_tool_use_records() {
        let log = concat!(
            r#"{"ts": "2026-07-01T10:00:05Z", "type": "tool_use", "tool": "Read", "input_summary": "src/lib.rs", "outcome": "success"}"#,
            "\n",
            "this line is not json\n",
            r#"{"ts": "2026-07-01T10:00:01Z", "type": "tool_use", "tool": "Grep", "input_summary": "fn main", "outcome": "success", "extra_field": 1}"#,
            "\n",
            r#"{"ts": "2026-07-01T10:00:03Z", "type": "assistant_message", "tool": "ignored"}"#,
            "\n",
        );
        let events = parse_session_log(log);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tool, "Grep");
        assert_eq!(events[1].tool, "Read");
    }

    #[test]
    fn records_without_outcome_are_unknown() {
        let log = r#"{"ts": "2026-07-01T10:00:00Z", "type": "tool_use", "tool": "Bash", "input_summary": "ls"}"#;
        let events = parse_session_log(log);
        assert_eq!(events[0].outcome, Outcome::Unknown);
    }

    #[test]
    fn accepts_space_separated_timestamps() {
        let log = r#"{"ts": "2026-07-01 10:00:00", "type": "tool_use", "tool": "Bash", "input_summary": "ls", "outcome": "success"}"#;
        assert_eq!(parse_session_log(log).len(), 1);
    }
}
