//! # Context builder
//!
//! Assembles a bounded-token context packet for a task description:
//! Tier 1 golden rules (always, cached), Tier 2 domain- and tag-directed
//! knowledge, Tier 3 recent items while budget remains, plus appendices for
//! active experiments and pending reviews.

mod golden;

pub use golden::{filter_by_category, GoldenRulesCache, DEFAULT_GOLDEN_RULES};

use crate::config::ContextConfig;
use crate::error::Result;
use crate::storage::{HeuristicQuery, Store};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Approximate chars per token used for all budget accounting
const CHARS_PER_TOKEN: usize = 4;

/// Per-tier item limit when pulling from the store
const TIER_ITEM_LIMIT: i64 = 5;
/// Tier 3 item limit
const TIER3_ITEM_LIMIT: i64 = 3;

fn tokens_of(text: &str) -> i64 {
    (text.len() / CHARS_PER_TOKEN) as i64
}

/// Inputs for one context build.
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    pub task: String,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub max_tokens: i64,
    pub current_location: Option<String>,
}

/// Counts of what went into a packet, recorded in the query audit.
#[derive(Debug, Clone, Default)]
pub struct ContextCounts {
    pub heuristics: i64,
    pub learnings: i64,
    pub experiments: i64,
    pub ceo_reviews: i64,
    pub approx_tokens: i64,
}

/// The assembled packet plus its accounting.
#[derive(Debug, Clone)]
pub struct ContextPacket {
    pub content: String,
    pub counts: ContextCounts,
}

/// Running accumulator that stops emitting once the budget would overflow.
struct BudgetedWriter {
    out: String,
    used_tokens: i64,
    max_tokens: i64,
}

impl BudgetedWriter {
    fn new(max_tokens: i64) -> Self {
        Self { out: String::new(), used_tokens: 0, max_tokens }
    }

    /// Append when the item fits; returns false once the budget is spent.
    fn push(&mut self, text: &str) -> bool {
        let cost = tokens_of(text);
        if self.used_tokens + cost > self.max_tokens {
            return false;
        }
        self.out.push_str(text);
        self.used_tokens += cost;
        true
    }

    /// Append section scaffolding without budget enforcement (headers are
    /// negligible but still counted).
    fn push_header(&mut self, text: &str) {
        self.out.push_str(text);
        self.used_tokens += tokens_of(text);
    }

    fn remaining(&self) -> i64 {
        self.max_tokens - self.used_tokens
    }
}

/// Tiered context assembly over the store.
pub struct ContextBuilder<S> {
    store: S,
    config: ContextConfig,
    golden_rules_path: PathBuf,
    golden_cache: GoldenRulesCache,
}

impl<S: AsRef<dyn Store>> ContextBuilder<S> {
    pub fn new(store: S, config: ContextConfig, golden_rules_path: PathBuf) -> Self {
        let ttl = std::time::Duration::from_secs(config.golden_rules_cache_secs);
        Self { store, config, golden_rules_path, golden_cache: GoldenRulesCache::new(ttl) }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Golden rules content, optionally filtered to categories. Cached per
    /// path with TTL and mtime invalidation.
    pub async fn golden_rules(&self, categories: Option<&[String]>) -> Result<String> {
        let content = self.golden_cache.get(&self.golden_rules_path).await?;
        match categories {
            Some(categories) if !categories.is_empty() => {
                Ok(filter_by_category(&content, categories))
            }
            _ => Ok(content),
        }
    }

    /// Build the packet.
    #[instrument(skip(self, request), fields(domain = ?request.domain))]
    pub async fn build(&self, request: &ContextRequest) -> Result<ContextPacket> {
        let mut counts = ContextCounts::default();
        let max_tokens = if request.max_tokens > 0 {
            request.max_tokens
        } else {
            self.config.default_max_tokens
        };
        let mut writer = BudgetedWriter::new(max_tokens);

        writer.push_header(&format!("# Task Context\n\n{}\n\n---\n\n", request.task));

        // Tier 1: golden rules, always included
        let golden = self.golden_rules(None).await?;
        writer.push_header("# TIER 1: Golden Rules\n");
        writer.push_header(&golden);
        writer.push_header("\n");

        // Tier 2: domain- and tag-directed knowledge
        writer.push_header("\n# TIER 2: Relevant Knowledge\n\n");

        if let Some(domain) = &request.domain {
            writer.push_header(&format!("## Domain: {domain}\n\n"));
            let heuristics = self
                .store()
                .list_heuristics(&HeuristicQuery {
                    domain: Some(domain.clone()),
                    current_location: request.current_location.clone(),
                    include_dormant: false,
                    limit: Some(TIER_ITEM_LIMIT),
                })
                .await?;
            if !heuristics.is_empty() {
                writer.push_header("### Heuristics:\n");
                for h in &heuristics {
                    let mut entry = format!(
                        "- **{}** (confidence: {:.2}, validated: {}x)\n",
                        h.rule, h.confidence, h.times_validated
                    );
                    if let Some(explanation) = &h.explanation {
                        let _ = writeln!(entry, "  {explanation}\n");
                    }
                    if !writer.push(&entry) {
                        break;
                    }
                    counts.heuristics += 1;
                }
            }

            let learnings = self.store().list_learnings_by_domain(domain, TIER_ITEM_LIMIT).await?;
            if !learnings.is_empty() {
                writer.push_header("### Recent Learnings:\n");
                for l in &learnings {
                    let mut entry =
                        format!("- **{}** ({})\n", l.title, l.learning_type.as_str());
                    if let Some(summary) = &l.summary {
                        let _ = writeln!(entry, "  {summary}");
                    }
                    let _ = writeln!(entry, "  Tags: {}\n", l.tags.as_deref().unwrap_or(""));
                    if !writer.push(&entry) {
                        break;
                    }
                    counts.learnings += 1;
                }
            }
        }

        if !request.tags.is_empty() {
            writer.push_header(&format!("## Tag Matches: {}\n\n", request.tags.join(", ")));
            let matches =
                self.store().list_learnings_by_tags(&request.tags, TIER_ITEM_LIMIT).await?;
            for l in &matches {
                let mut entry = format!(
                    "- **{}** ({}, domain: {})\n",
                    l.title,
                    l.learning_type.as_str(),
                    l.domain.as_deref().unwrap_or("general")
                );
                if let Some(summary) = &l.summary {
                    let _ = writeln!(entry, "  {summary}");
                }
                let _ = writeln!(entry, "  Tags: {}\n", l.tags.as_deref().unwrap_or(""));
                if !writer.push(&entry) {
                    break;
                }
                counts.learnings += 1;
            }
        }

        // Tier 3: recency, only while a useful budget remains
        if writer.remaining() > self.config.tier3_min_remaining_tokens {
            writer.push_header("# TIER 3: Recent Context\n\n");
            let recent = self.store().list_recent_learnings(None, TIER3_ITEM_LIMIT).await?;
            for l in &recent {
                let mut entry = format!(
                    "- **{}** ({}, {})\n",
                    l.title,
                    l.learning_type.as_str(),
                    l.created_at.format("%Y-%m-%d %H:%M")
                );
                if let Some(summary) = &l.summary {
                    let _ = writeln!(entry, "  {summary}\n");
                }
                if !writer.push(&entry) {
                    break;
                }
                counts.learnings += 1;
            }
        }

        // Appendices
        let experiments = self.store().list_active_experiments().await?;
        if !experiments.is_empty() {
            writer.push_header("\n# Active Experiments\n\n");
            for exp in &experiments {
                let mut entry = format!("- **{}** ({} cycles)\n", exp.name, exp.cycles_run);
                if let Some(hypothesis) = &exp.hypothesis {
                    let _ = writeln!(entry, "  Hypothesis: {hypothesis}\n");
                }
                if !writer.push(&entry) {
                    break;
                }
                counts.experiments += 1;
            }
        }

        let reviews = self.store().list_pending_ceo_reviews().await?;
        if !reviews.is_empty() {
            writer.push_header("\n# Pending CEO Reviews\n\n");
            for review in &reviews {
                let mut entry = format!("- **{}**\n", review.title);
                if let Some(context) = &review.context {
                    let _ = writeln!(entry, "  Context: {context}");
                }
                if let Some(recommendation) = &review.recommendation {
                    let _ = writeln!(entry, "  Recommendation: {recommendation}\n");
                }
                if !writer.push(&entry) {
                    break;
                }
                counts.ceo_reviews += 1;
            }
        }

        counts.approx_tokens = writer.used_tokens;
        debug!(tokens = writer.used_tokens, "Built context packet");
        Ok(ContextPacket { content: writer.out, counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_writer_stops_at_the_budget() {
        let mut writer = BudgetedWriter::new(10);
        assert!(writer.push("12345678")); // 2 tokens
        assert!(writer.push("12345678901234567890123456789012")); // 8 tokens
        assert!(!writer.push("12345")); // would exceed
        assert_eq!(writer.used_tokens, 10);
    }

    #[test]
    fn token_estimate_is_len_over_four() {
        assert_eq!(tokens_of("12345678"), 2);
        assert_eq!(tokens_of(""), 0);
        assert_eq!(tokens_of("abc"), 0);
    }
}
