//! Markdown rollup files for heuristics.
//!
//! Each domain gets an append-only `memory/heuristics/<domain>.md`; the core
//! appends one entry per recorded heuristic in the documented format.

use crate::error::{Error, Result};
use crate::model::Heuristic;
use std::path::Path;
use tracing::debug;

/// Format one heuristic as its markdown rollup entry.
pub fn format_entry(heuristic: &Heuristic) -> String {
    let source = heuristic
        .source_type
        .map(|s| s.as_str())
        .unwrap_or("observation");
    let location = heuristic.project_path.as_deref().unwrap_or("global");
    format!(
        "## H-{id}: {rule}\n\n\
         **Confidence**: {confidence}\n\
         **Source**: {source}\n\
         **Location**: {location}\n\
         **Created**: {created}\n\n\
         {explanation}\n\n\
         ---\n\n",
        id = heuristic.id,
        rule = heuristic.rule,
        confidence = heuristic.confidence,
        created = heuristic.created_at.format("%Y-%m-%d"),
        explanation = heuristic.explanation.as_deref().unwrap_or(""),
    )
}

fn domain_file_header(domain: &str) -> String {
    format!(
        "# Heuristics: {domain}\n\n\
         Generated from failures, successes, and observations in the **{domain}** domain.\n\n\
         ---\n\n"
    )
}

/// Refuse to write through symlinked files or directories.
fn check_symlink_safe(path: &Path) -> Result<()> {
    if path.is_symlink() {
        return Err(Error::Configuration(format!(
            "Refusing to write through symlink: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        if parent.is_symlink() {
            return Err(Error::Configuration(format!(
                "Refusing to write under symlinked directory: {}",
                parent.display()
            )));
        }
    }
    Ok(())
}

/// Append a heuristic entry to its domain rollup file, creating the file
/// with its header when new.
pub async fn append_domain_entry(
    heuristics_dir: &Path,
    heuristic: &Heuristic,
) -> Result<()> {
    tokio::fs::create_dir_all(heuristics_dir).await?;
    let file_path = heuristics_dir.join(format!("{}.md", heuristic.domain));
    check_symlink_safe(&file_path)?;

    let mut content = String::new();
    if !file_path.exists() {
        content.push_str(&domain_file_header(&heuristic.domain));
    }
    content.push_str(&format_entry(heuristic));

    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;

    debug!(path = %file_path.display(), heuristic_id = heuristic.id, "Appended rollup entry");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeuristicStatus, SourceType};
    use chrono::{TimeZone, Utc};

    fn sample(id: i64, project_path: Option<&str>) -> Heuristic {
        Heuristic {
            id,
            domain: "error-handling".into(),
            rule: "Always log before raising".into(),
            explanation: Some("Context at the raise site is cheap to keep.".into()),
            source_type: Some(SourceType::Failure),
            source_id: None,
            confidence: 0.8,
            confidence_ema: Some(0.8),
            ema_alpha: Some(0.3),
            ema_warmup_remaining: 3,
            times_validated: 0,
            times_violated: 0,
            times_contradicted: 0,
            times_revived: 0,
            is_golden: false,
            status: HeuristicStatus::Active,
            dormant_since: None,
            revival_conditions: None,
            last_used_at: None,
            last_confidence_update: None,
            update_count_today: 0,
            update_count_reset_date: None,
            min_applications: 10,
            fraud_flags: 0,
            is_quarantined: false,
            last_fraud_check: None,
            project_path: project_path.map(str::to_string),
            created_at: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn entry_format_matches_the_documented_shape() {
        let entry = format_entry(&sample(12, None));
        assert!(entry.starts_with("## H-12: Always log before raising\n"));
        assert!(entry.contains("**Confidence**: 0.8"));
        assert!(entry.contains("**Source**: failure"));
        assert!(entry.contains("**Location**: global"));
        assert!(entry.contains("**Created**: 2026-07-01"));
        assert!(entry.trim_end().ends_with("---"));
    }

    #[test]
    fn location_pinned_rules_show_their_path() {
        let entry = format_entry(&sample(3, Some("/work/projects/api")));
        assert!(entry.contains("**Location**: /work/projects/api"));
    }

    #[tokio::test]
    async fn appends_create_header_once() {
        let dir = tempfile::tempdir().unwrap();
        append_domain_entry(dir.path(), &sample(1, None)).await.unwrap();
        append_domain_entry(dir.path(), &sample(2, None)).await.unwrap();

        let content =
            tokio::fs::read_to_string(dir.path().join("error-handling.md")).await.unwrap();
        assert_eq!(content.matches("# Heuristics: error-handling").count(), 1);
        assert!(content.contains("## H-1:"));
        assert!(content.contains("## H-2:"));
    }
}
