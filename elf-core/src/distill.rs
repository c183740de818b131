//! # Distiller
//!
//! Promotes patterns to heuristics and maintains the auto-distilled section
//! of the golden-rules file:
//! - time-based decay of pattern strength
//! - promotion-candidate selection under a token budget
//! - heuristic creation (one transaction with the promotion stamp)
//! - atomic rewrite of only the `# Auto-Distilled Patterns` section

use crate::config::{DistillConfig, LifecycleConfig};
use crate::error::Result;
use crate::model::{NewHeuristic, Pattern, SourceType};
use crate::storage::Store;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Header delimiting the only section of the golden-rules file the core
/// ever rewrites
pub const AUTO_SECTION_MARKER: &str = "# Auto-Distilled Patterns";

/// Approximate chars per token for budget accounting
pub const CHARS_PER_TOKEN: usize = 4;

/// Selection stops once the remaining budget drops below this
const MIN_VIABLE_BUDGET_TOKENS: i64 = 100;

/// Exponential decay factor: strength halves every `half_life` days.
pub fn decay_factor(age_days: f64, half_life_days: f64) -> f64 {
    0.5_f64.powf(age_days / half_life_days)
}

/// Approximate token count of a text block.
pub fn estimate_tokens(text: &str) -> i64 {
    (text.len() / CHARS_PER_TOKEN) as i64
}

/// One promotion performed by a distillation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub pattern_id: i64,
    pub heuristic_id: i64,
    pub pattern_text: String,
}

/// Summary of a distillation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistillationSummary {
    pub patterns_decayed: u64,
    pub candidates_found: usize,
    pub patterns_promoted: usize,
    pub promotions: Vec<Promotion>,
    pub golden_rules_appended: usize,
    pub dry_run: bool,
    /// Candidates that would be promoted, populated on dry runs
    pub would_promote: Vec<String>,
}

/// Format one pattern as a golden-rules entry.
fn format_entry(pattern: &Pattern, rule_number: usize) -> String {
    let title: String = pattern.pattern_text.chars().take(50).collect();
    format!(
        "---\n\n## {rule_number}. {title}\n> {text}\n\n\
         **Why:** Observed {occ}x across {sessions} sessions. Auto-distilled pattern.\n\
         **Domain:** {domain}\n\
         **Confidence:** {strength:.2} | Validated: {occ} | Violated: 0\n\n",
        text = pattern.pattern_text,
        occ = pattern.occurrence_count,
        sessions = pattern.session_ids.len(),
        domain = pattern.domain,
        strength = pattern.strength,
    )
}

/// Select candidates within the token budget, strongest first.
fn select_within_budget(mut candidates: Vec<Pattern>, token_budget: i64) -> Vec<Pattern> {
    candidates.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then(b.occurrence_count.cmp(&a.occurrence_count))
    });

    let mut selected = Vec::new();
    let mut remaining = token_budget;
    for pattern in candidates {
        let needed = estimate_tokens(&format_entry(&pattern, 0));
        if needed <= remaining {
            remaining -= needed;
            selected.push(pattern);
        }
        if remaining < MIN_VIABLE_BUDGET_TOKENS {
            break;
        }
    }
    selected
}

/// The distiller. Runs on a timer or on demand; idempotent between events.
pub struct Distiller<S> {
    store: S,
    config: DistillConfig,
    lifecycle: LifecycleConfig,
    golden_rules_path: PathBuf,
}

impl<S: AsRef<dyn Store>> Distiller<S> {
    pub fn new(
        store: S,
        config: DistillConfig,
        lifecycle: LifecycleConfig,
        golden_rules_path: PathBuf,
    ) -> Self {
        Self { store, config, lifecycle, golden_rules_path }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Apply time decay to all patterns (optionally scoped to a project).
    /// Strength floors at the configured minimum; rows are never deleted.
    #[instrument(skip(self))]
    pub async fn apply_decay(&self, project_path: Option<&str>) -> Result<u64> {
        let now = Utc::now();
        let patterns = self.store().list_patterns(project_path, false).await?;
        let mut updated = 0u64;

        for pattern in patterns {
            let age_days = (now - pattern.last_seen).num_seconds() as f64 / 86_400.0;
            if age_days <= 0.0 {
                continue;
            }
            let decayed = (pattern.strength
                * decay_factor(age_days, self.config.decay_half_life_days))
            .max(self.config.decay_floor);
            if (decayed - pattern.strength).abs() > 0.001 {
                self.store().set_pattern_strength(pattern.id, decayed).await?;
                updated += 1;
            }
        }
        debug!(updated, "Applied pattern decay");
        Ok(updated)
    }

    /// Run the full distillation pipeline.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        project_path: Option<&str>,
        auto_append: bool,
        dry_run: bool,
    ) -> Result<DistillationSummary> {
        let mut summary = DistillationSummary { dry_run, ..DistillationSummary::default() };
        let now = Utc::now();

        if dry_run {
            summary.patterns_decayed = self
                .store()
                .list_patterns(project_path, false)
                .await?
                .iter()
                .filter(|p| (now - p.last_seen).num_days() > 0)
                .count() as u64;
        } else {
            summary.patterns_decayed = self.apply_decay(project_path).await?;
        }

        let unpromoted = self.store().list_patterns(project_path, true).await?;
        let candidates: Vec<Pattern> = unpromoted
            .into_iter()
            .filter(|p| p.is_promotion_candidate(now))
            .collect();
        summary.candidates_found = candidates.len();
        if candidates.is_empty() {
            return Ok(summary);
        }

        let selected = select_within_budget(candidates, self.config.token_budget);

        if dry_run {
            summary.would_promote = selected
                .iter()
                .map(|p| {
                    let text: String = p.pattern_text.chars().take(80).collect();
                    format!("[{:.2}] {text}", p.strength)
                })
                .collect();
            return Ok(summary);
        }

        let mut promoted = Vec::new();
        for pattern in &selected {
            let new = NewHeuristic {
                domain: pattern.domain.clone(),
                rule: pattern.pattern_text.clone(),
                explanation: Some(format!(
                    "Auto-extracted pattern: {}. Observed {}x across {} sessions.",
                    pattern.signature,
                    pattern.occurrence_count,
                    pattern.session_ids.len()
                )),
                source_type: SourceType::AutoDistilled,
                source_id: Some(pattern.id),
                confidence: pattern.strength,
                times_validated: pattern.occurrence_count,
                is_golden: false,
                project_path: pattern.project_path.clone(),
            };
            match self
                .store()
                .promote_pattern(
                    pattern.id,
                    &new,
                    self.lifecycle.ema_alpha,
                    self.lifecycle.ema_warmup_updates,
                )
                .await
            {
                Ok(heuristic) => {
                    summary.promotions.push(Promotion {
                        pattern_id: pattern.id,
                        heuristic_id: heuristic.id,
                        pattern_text: pattern.pattern_text.chars().take(80).collect(),
                    });
                    promoted.push(pattern.clone());
                }
                Err(e) => {
                    warn!(pattern_id = pattern.id, error = %e, "Failed to promote pattern");
                }
            }
        }
        summary.patterns_promoted = summary.promotions.len();

        if auto_append && !promoted.is_empty() {
            summary.golden_rules_appended =
                rewrite_auto_section(&self.golden_rules_path, &promoted).await?;
        }

        info!(
            promoted = summary.patterns_promoted,
            appended = summary.golden_rules_appended,
            "Distillation complete"
        );
        Ok(summary)
    }
}

/// Replace the auto-distilled section of the golden-rules file, preserving
/// everything above the marker verbatim. The file is written atomically via
/// a temp file and rename.
pub async fn rewrite_auto_section(path: &Path, patterns: &[Pattern]) -> Result<usize> {
    if patterns.is_empty() {
        return Ok(0);
    }
    if !path.exists() {
        warn!(path = %path.display(), "Golden rules file not found; skipping auto-append");
        return Ok(0);
    }

    let content = tokio::fs::read_to_string(path).await?;

    // Continue numbering after the highest manually numbered rule
    let mut next_number = content
        .lines()
        .filter_map(|line| {
            line.strip_prefix("## ")
                .and_then(|rest| rest.split('.').next())
                .and_then(|n| n.parse::<usize>().ok())
        })
        .max()
        .map_or(1, |n| n + 1);

    let preserved = match content.find(AUTO_SECTION_MARKER) {
        Some(index) => format!("{}\n\n", content[..index].trim_end()),
        None => format!("{}\n\n", content.trim_end()),
    };

    let mut section = format!(
        "{AUTO_SECTION_MARKER}\n> Auto-generated: {}\n> These patterns were extracted from session observations.\n\n",
        Utc::now().format("%Y-%m-%d %H:%M")
    );
    for pattern in patterns {
        section.push_str(&format_entry(pattern, next_number));
        next_number += 1;
    }

    let rewritten = format!("{preserved}{section}");
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, rewritten).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    Ok(patterns.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatternKind;
    use chrono::Duration;

    fn pattern(id: i64, strength: f64, occurrences: i64) -> Pattern {
        let now = Utc::now();
        Pattern {
            id,
            kind: PatternKind::Retry,
            pattern_text: format!("Pattern number {id} about retrying with a longer timeout"),
            signature: format!("sig-{id}"),
            pattern_hash: format!("{id:016x}"),
            occurrence_count: occurrences,
            first_seen: now - Duration::days(3),
            last_seen: now,
            session_ids: vec!["a".into(), "b".into()],
            domain: "shell".into(),
            project_path: None,
            strength,
            promoted_to_heuristic_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn decay_halves_per_half_life() {
        assert!((decay_factor(7.0, 7.0) - 0.5).abs() < 1e-12);
        assert!((decay_factor(14.0, 7.0) - 0.25).abs() < 1e-12);
        assert!((decay_factor(0.0, 7.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn selection_orders_by_strength_then_occurrences() {
        let candidates =
            vec![pattern(1, 0.7, 10), pattern(2, 0.9, 3), pattern(3, 0.9, 8)];
        let selected = select_within_budget(candidates, 2000);
        let ids: Vec<i64> = selected.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn selection_respects_the_token_budget() {
        let candidates: Vec<Pattern> =
            (1..=50).map(|i| pattern(i, 0.8, 5)).collect();
        let entry_tokens = estimate_tokens(&format_entry(&pattern(1, 0.8, 5), 0));
        let budget = entry_tokens * 3 + 10;
        let selected = select_within_budget(candidates, budget);
        assert!(selected.len() <= 4);
        assert!(!selected.is_empty());
    }

    #[tokio::test]
    async fn auto_section_rewrite_preserves_manual_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden-rules.md");
        let manual = "# Golden Rules\n\n## 1. Ship small diffs\n> Keep changes reviewable.\n";
        tokio::fs::write(&path, manual).await.unwrap();

        let appended = rewrite_auto_section(&path, &[pattern(1, 0.8, 5)]).await.unwrap();
        assert_eq!(appended, 1);

        let first = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(first.starts_with("# Golden Rules"));
        assert!(first.contains("## 1. Ship small diffs"));
        assert!(first.contains(AUTO_SECTION_MARKER));
        // Numbering continues after the manual rules
        assert!(first.contains("## 2. Pattern number 1"));

        // A second rewrite replaces only the auto section
        rewrite_auto_section(&path, &[pattern(2, 0.9, 7)]).await.unwrap();
        let second = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(second.contains("## 1. Ship small diffs"));
        assert!(second.contains("Pattern number 2"));
        assert!(!second.contains("Pattern number 1 "));
        assert_eq!(second.matches(AUTO_SECTION_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn missing_golden_rules_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.md");
        let appended = rewrite_auto_section(&path, &[pattern(1, 0.8, 5)]).await.unwrap();
        assert_eq!(appended, 0);
    }
}
