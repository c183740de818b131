//! # Lifecycle engine
//!
//! Owns every write that changes a heuristic's confidence, status,
//! application counters, or its place in a domain. Raw repository CRUD never
//! touches those columns.

mod confidence;
mod elasticity;
mod quality;

pub use confidence::{plan_update, UpdatePlan, UpdateRequest};
pub use elasticity::{admit, novelty, rule_similarity, Admission};
pub use quality::{assess, QualityReport};

use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::model::{
    ConfidenceUpdate, Heuristic, HeuristicStatus, NewHeuristic, UpdateType,
};
use crate::storage::{ConfidenceTransition, NewConfidenceUpdate, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Similarity threshold above which an existing rule is reported to the
/// caller as a near-duplicate
const SIMILARITY_REPORT_THRESHOLD: f64 = 0.5;

/// Bucketed recency factor for eviction scoring.
pub fn recency_factor(days_since_use: Option<f64>) -> f64 {
    match days_since_use {
        None => 0.25,
        Some(days) if days <= 7.0 => 1.0,
        Some(days) if days <= 14.0 => 0.85,
        Some(days) if days <= 30.0 => 0.7,
        Some(days) if days <= 60.0 => 0.5,
        Some(days) if days <= 90.0 => 0.3,
        Some(_) => 0.1,
    }
}

/// Bucketed evidence factor for eviction scoring.
pub fn evidence_factor(times_validated: i64) -> f64 {
    match times_validated {
        0 => 0.5,
        1..=2 => 0.7,
        3..=9 => 0.85,
        _ => 1.0,
    }
}

/// Eviction score: `confidence * recency_factor * evidence_factor`. The
/// schema's `eviction_candidates` view computes the same expression in SQL.
pub fn eviction_score(confidence: f64, days_since_use: Option<f64>, times_validated: i64) -> f64 {
    confidence * recency_factor(days_since_use) * evidence_factor(times_validated)
}

/// An existing rule similar enough to a candidate to report back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRule {
    pub id: i64,
    pub rule: String,
    pub confidence: f64,
    pub similarity: f64,
}

/// Result of recording a heuristic: the stored row plus advisory findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedHeuristic {
    pub heuristic: Heuristic,
    pub quality: QualityReport,
    pub similar: Vec<SimilarRule>,
}

/// Outcome of a capacity-enforcement pass on one domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractionSummary {
    pub domain: String,
    pub evicted: Vec<i64>,
    pub within_grace_period: bool,
}

/// The lifecycle engine. Holds the store handle and the configured EMA and
/// capacity defaults.
pub struct LifecycleEngine<S> {
    store: S,
    config: LifecycleConfig,
    /// Serializes read-modify-write confidence updates so concurrent
    /// callers produce a totally ordered audit chain.
    update_lock: tokio::sync::Mutex<()>,
}

impl<S: AsRef<dyn Store>> LifecycleEngine<S> {
    pub fn new(store: S, config: LifecycleConfig) -> Self {
        Self { store, config, update_lock: tokio::sync::Mutex::new(()) }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Apply a typed confidence event to a heuristic.
    #[instrument(skip(self, request), fields(heuristic_id))]
    pub async fn update_confidence(
        &self,
        heuristic_id: i64,
        request: &UpdateRequest,
    ) -> Result<ConfidenceUpdate> {
        let _guard = self.update_lock.lock().await;
        let heuristic = self
            .store()
            .get_heuristic(heuristic_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("heuristic {heuristic_id}")))?;

        let plan = plan_update(&heuristic, request, &self.config, Utc::now())?;
        if plan.audit.rate_limited {
            debug!(heuristic_id, "Confidence increase rate-limited for today");
        }
        let update = self
            .store()
            .record_confidence_transition(heuristic_id, &plan.transition, &plan.audit)
            .await?;
        debug!(
            heuristic_id,
            old = update.old_confidence,
            new = update.new_confidence,
            update_type = update.update_type.as_str(),
            "Applied confidence update"
        );
        Ok(update)
    }

    /// Record a new heuristic, running capacity admission for its domain.
    /// Quality findings and near-duplicates are advisory and returned to
    /// the caller.
    #[instrument(skip(self, new), fields(domain = %new.domain))]
    pub async fn record_heuristic(&self, new: &NewHeuristic) -> Result<RecordedHeuristic> {
        let meta = self
            .store()
            .ensure_domain_metadata(
                &new.domain,
                self.config.default_soft_limit,
                self.config.default_hard_limit,
            )
            .await?;

        let existing = self.store().list_active_heuristics_in_domain(&new.domain).await?;
        let candidate_novelty = novelty(&new.rule, &existing);

        match admit(new, candidate_novelty, new.times_validated, &meta) {
            Admission::Admit => {}
            Admission::RejectedOverflow { reason } => {
                warn!(domain = %new.domain, reason, "Heuristic rejected in overflow");
                return Err(Error::Validation(format!(
                    "Domain '{}' is over its soft limit; candidate rejected: {reason}",
                    new.domain
                )));
            }
            Admission::RejectedCritical => {
                warn!(domain = %new.domain, "Heuristic rejected: domain critical");
                return Err(Error::Validation(format!(
                    "Domain '{}' is at its hard limit; raise the cap or evict before inserting",
                    new.domain
                )));
            }
        }

        let similar: Vec<SimilarRule> = {
            let mut similar: Vec<SimilarRule> = existing
                .iter()
                .filter_map(|h| {
                    let similarity = rule_similarity(&new.rule, &h.rule);
                    (similarity > SIMILARITY_REPORT_THRESHOLD).then(|| SimilarRule {
                        id: h.id,
                        rule: h.rule.clone(),
                        confidence: h.confidence,
                        similarity,
                    })
                })
                .collect();
            similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            similar.truncate(3);
            similar
        };

        let quality = assess(&new.rule, new.explanation.as_deref().unwrap_or(""));
        if !quality.passed {
            debug!(domain = %new.domain, warnings = quality.warnings.len(), "Quality checklist warnings");
        }

        let heuristic = self
            .store()
            .insert_heuristic(new, self.config.ema_alpha, self.config.ema_warmup_updates)
            .await?;
        info!(id = heuristic.id, domain = %heuristic.domain, "Recorded heuristic");

        Ok(RecordedHeuristic { heuristic, quality, similar })
    }

    /// Revive dormant heuristics whose declared revival conditions match any
    /// of the given tokens (tags of a new learning, or observation
    /// triggers). Returns the revived ids.
    #[instrument(skip(self, tokens))]
    pub async fn revive_matching(&self, tokens: &[String]) -> Result<Vec<i64>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = tokens.iter().map(|t| t.trim().to_lowercase()).collect();
        let dormant = self.store().list_dormant_heuristics().await?;
        let mut revived = Vec::new();

        for heuristic in dormant {
            let Some(conditions) = heuristic.revival_conditions.as_deref() else {
                continue;
            };
            let matched = conditions
                .split([',', ' '])
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .any(|c| lowered.contains(&c));
            if !matched {
                continue;
            }

            let now = Utc::now();
            let transition = ConfidenceTransition {
                confidence: heuristic.confidence,
                confidence_ema: heuristic.confidence_ema,
                ema_warmup_remaining: heuristic.ema_warmup_remaining,
                times_validated: heuristic.times_validated,
                times_violated: heuristic.times_violated,
                times_contradicted: heuristic.times_contradicted,
                times_revived: heuristic.times_revived + 1,
                status: HeuristicStatus::Active,
                dormant_since: None,
                last_used_at: Some(now),
                last_confidence_update: heuristic.last_confidence_update,
                update_count_today: heuristic.update_count_today,
                update_count_reset_date: heuristic.update_count_reset_date,
            };
            let audit = NewConfidenceUpdate {
                old_confidence: heuristic.confidence,
                new_confidence: heuristic.confidence,
                delta: 0.0,
                update_type: UpdateType::Revival,
                reason: Some("revival condition matched".to_string()),
                session_id: None,
                agent_id: None,
                rate_limited: false,
                raw_target_confidence: None,
                smoothed_delta: None,
                alpha_used: None,
            };
            self.store()
                .record_confidence_transition(heuristic.id, &transition, &audit)
                .await?;
            info!(heuristic_id = heuristic.id, "Revived dormant heuristic");
            revived.push(heuristic.id);
        }
        Ok(revived)
    }

    /// Bring a domain back to its soft cap by evicting the lowest-scoring
    /// rows, honoring the grace period after overflow entry.
    #[instrument(skip(self))]
    pub async fn enforce_capacity(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<ContractionSummary> {
        let mut summary = ContractionSummary { domain: domain.to_string(), ..Default::default() };

        let Some(meta) = self.store().get_domain_metadata(domain).await? else {
            return Ok(summary);
        };
        if meta.current_count <= meta.soft_limit {
            return Ok(summary);
        }

        let overflow_days = meta.overflow_days(now).unwrap_or(0.0);
        if overflow_days < meta.grace_period_days as f64 {
            summary.within_grace_period = true;
            debug!(domain, overflow_days, "Contraction deferred: grace period");
            return Ok(summary);
        }

        let to_evict = meta.current_count - meta.soft_limit;
        let candidates = self.store().list_eviction_candidates(domain).await?;
        for candidate in candidates
            .iter()
            .filter(|c| c.status == HeuristicStatus::Active)
            .take(to_evict as usize)
        {
            self.store()
                .set_heuristic_status(candidate.heuristic_id, HeuristicStatus::Evicted, None)
                .await?;
            summary.evicted.push(candidate.heuristic_id);
        }
        if !summary.evicted.is_empty() {
            info!(domain, evicted = summary.evicted.len(), "Contracted domain to soft cap");
        }
        Ok(summary)
    }

    /// Refresh the derived health columns on a domain's capacity row.
    pub async fn refresh_domain_health(&self, domain: &str) -> Result<()> {
        let active = self.store().list_active_heuristics_in_domain(domain).await?;
        if active.is_empty() {
            return self.store().update_domain_health(domain, None, None).await;
        }
        let avg_confidence =
            active.iter().map(|h| h.confidence).sum::<f64>() / active.len() as f64;
        let meta = self.store().get_domain_metadata(domain).await?;
        let occupancy = meta
            .map(|m| (m.soft_limit as f64 / (m.current_count.max(1)) as f64).min(1.0))
            .unwrap_or(1.0);
        let health = avg_confidence * occupancy;
        self.store().update_domain_health(domain, Some(avg_confidence), Some(health)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_buckets_match_the_scoring_view() {
        assert!((recency_factor(Some(3.0)) - 1.0).abs() < 1e-12);
        assert!((recency_factor(Some(10.0)) - 0.85).abs() < 1e-12);
        assert!((recency_factor(Some(25.0)) - 0.7).abs() < 1e-12);
        assert!((recency_factor(Some(45.0)) - 0.5).abs() < 1e-12);
        assert!((recency_factor(Some(80.0)) - 0.3).abs() < 1e-12);
        assert!((recency_factor(Some(120.0)) - 0.1).abs() < 1e-12);
        assert!((recency_factor(None) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn evidence_buckets_match_the_scoring_view() {
        assert!((evidence_factor(0) - 0.5).abs() < 1e-12);
        assert!((evidence_factor(2) - 0.7).abs() < 1e-12);
        assert!((evidence_factor(9) - 0.85).abs() < 1e-12);
        assert!((evidence_factor(10) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn eviction_score_combines_all_three_factors() {
        // fresh, well-evidenced, confident rule keeps its confidence as score
        assert!((eviction_score(0.8, Some(1.0), 20) - 0.8).abs() < 1e-12);
        // stale unevidenced rule collapses
        assert!((eviction_score(0.8, Some(120.0), 0) - 0.8 * 0.1 * 0.5).abs() < 1e-12);
    }
}
