//! # Fraud detector
//!
//! Multi-signal statistical anomaly detection over confidence histories:
//! success-rate z-score against the domain baseline, temporal gaming, and
//! unnatural confidence trajectories, fused into a Bayesian posterior.
//!
//! Golden heuristics are whitelisted from all detectors. Detection never
//! quarantines on its own: `fraud_likely` and `fraud_confirmed` reports get
//! an alert-type response row and wait for a human decision.

mod detectors;

pub use detectors::{fuse, success_rate_anomaly, temporal_manipulation, unnatural_confidence_growth};

use crate::config::FraudConfig;
use crate::error::{Error, Result};
use crate::model::{DomainBaseline, FraudClassification, FraudReport};
use crate::stats::{mean, sample_std};
use crate::storage::Store;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

/// Lookback for the temporal detector
const TEMPORAL_WINDOW_DAYS: i64 = 30;
/// Lookback for the trajectory detector
const TRAJECTORY_WINDOW_DAYS: i64 = 60;
/// A heuristic is due for a sweep check after this long
const SWEEP_STALENESS_HOURS: i64 = 24;

/// Classify a fused posterior probability.
pub fn classify(fraud_score: f64, config: &FraudConfig) -> FraudClassification {
    if fraud_score > config.threshold_fraud_confirmed {
        FraudClassification::FraudConfirmed
    } else if fraud_score > config.threshold_fraud_likely {
        FraudClassification::FraudLikely
    } else if fraud_score > config.threshold_suspicious {
        FraudClassification::Suspicious
    } else if fraud_score > 0.0 {
        FraudClassification::LowConfidence
    } else {
        FraudClassification::Clean
    }
}

/// The fraud-detection engine.
pub struct FraudDetector<S> {
    store: S,
    config: FraudConfig,
}

impl<S: AsRef<dyn Store>> FraudDetector<S> {
    pub fn new(store: S, config: FraudConfig) -> Self {
        Self { store, config }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Run all detectors on one heuristic, fuse the signals, persist the
    /// report, and record an alert response for actionable classifications.
    #[instrument(skip(self))]
    pub async fn run_check(&self, heuristic_id: i64) -> Result<FraudReport> {
        let heuristic = self
            .store()
            .get_heuristic(heuristic_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("heuristic {heuristic_id}")))?;

        let signals = if heuristic.is_golden {
            debug!(heuristic_id, "Golden heuristic whitelisted from fraud detectors");
            Vec::new()
        } else {
            let now = Utc::now();
            let mut signals = Vec::new();

            let baseline = self.store().get_domain_baseline(&heuristic.domain).await?;
            if let Some(signal) =
                success_rate_anomaly(&heuristic, baseline.as_ref(), &self.config)
            {
                signals.push(signal);
            }

            let temporal_updates = self
                .store()
                .list_confidence_updates(heuristic_id, now - Duration::days(TEMPORAL_WINDOW_DAYS))
                .await?;
            if let Some(signal) = temporal_manipulation(&temporal_updates, &self.config) {
                signals.push(signal);
            }

            let trajectory_updates = self
                .store()
                .list_confidence_updates(
                    heuristic_id,
                    now - Duration::days(TRAJECTORY_WINDOW_DAYS),
                )
                .await?;
            if let Some(signal) = unnatural_confidence_growth(&trajectory_updates, &self.config) {
                signals.push(signal);
            }
            signals
        };

        let (fraud_score, likelihood_ratio) = fuse(&signals, self.config.prior_fraud_rate);
        let classification = classify(fraud_score, &self.config);

        let report = self
            .store()
            .insert_fraud_report(
                heuristic_id,
                fraud_score,
                classification,
                likelihood_ratio,
                &signals,
            )
            .await?;

        if classification.warrants_alert() {
            warn!(
                heuristic_id,
                classification = classification.as_str(),
                fraud_score,
                "Fraud detection raised an alert"
            );
            self.store()
                .insert_fraud_response(
                    report.id,
                    "alert",
                    &json!({
                        "classification": classification.as_str(),
                        "fraud_score": fraud_score,
                        "signal_count": signals.len(),
                    }),
                )
                .await?;
        }

        Ok(report)
    }

    /// Recompute a domain's baseline from its active, sufficiently applied
    /// heuristics. Requires at least three; the store snapshots history and
    /// drift on write.
    #[instrument(skip(self))]
    pub async fn update_baseline(&self, domain: &str) -> Result<Option<DomainBaseline>> {
        let heuristics = self.store().list_active_heuristics_in_domain(domain).await?;
        let success_rates: Vec<f64> = heuristics
            .iter()
            .filter(|h| h.total_applications() >= self.config.min_applications)
            .filter_map(|h| h.success_rate())
            .collect();

        if success_rates.len() < 3 {
            debug!(domain, samples = success_rates.len(), "Too few heuristics for a baseline");
            return Ok(None);
        }

        let frequencies = self.store().domain_update_frequencies(domain).await?;
        let baseline = DomainBaseline {
            domain: domain.to_string(),
            avg_success_rate: mean(&success_rates),
            std_success_rate: sample_std(&success_rates),
            avg_update_frequency: mean(&frequencies),
            std_update_frequency: sample_std(&frequencies),
            sample_count: success_rates.len() as i64,
            last_updated: Utc::now(),
        };
        self.store().upsert_domain_baseline(&baseline).await?;
        info!(domain, samples = baseline.sample_count, "Refreshed domain baseline");
        Ok(Some(baseline))
    }

    /// Sweep heuristics whose last check is older than 24 hours and whose
    /// application count qualifies, bounded per run. Clean rows still get
    /// their `last_fraud_check` stamped so the staleness filter advances.
    #[instrument(skip(self))]
    pub async fn sweep(&self, batch_limit: i64) -> Result<Vec<FraudReport>> {
        let stale_before = Utc::now() - Duration::hours(SWEEP_STALENESS_HOURS);
        let candidates = self
            .store()
            .list_fraud_check_candidates(stale_before, self.config.min_applications, batch_limit)
            .await?;

        let mut reports = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.run_check(candidate.id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(heuristic_id = candidate.id, error = %e, "Fraud check failed in sweep");
                    // keep the staleness cursor moving even on failure
                    self.store().stamp_fraud_check(candidate.id).await?;
                }
            }
        }
        Ok(reports)
    }

    /// Store session context for selectivity analysis: sha256 hash plus a
    /// short preview, retained for the configured window.
    pub async fn track_context(
        &self,
        session_id: &str,
        context_text: &str,
        heuristics_applied: &[i64],
        agent_id: Option<&str>,
    ) -> Result<()> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(context_text.as_bytes());
        let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let preview: String = context_text.chars().take(100).collect();
        self.store()
            .insert_session_context(session_id, agent_id, &hash, &preview, heuristics_applied)
            .await
    }

    /// Purge session-context rows past the retention window.
    pub async fn cleanup_contexts(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.config.context_retention_days);
        let purged = self.store().purge_session_contexts(cutoff).await?;
        if purged > 0 {
            debug!(purged, "Purged expired session contexts");
        }
        Ok(purged)
    }
}
