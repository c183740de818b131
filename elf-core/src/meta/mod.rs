//! # Meta-observer
//!
//! Rolling-window trend detection and z-score anomaly alerting over recorded
//! metrics, with alert deduplication, a `new -> active -> ack -> resolved`
//! state machine, false-positive-rate tracking, and a bootstrap mode for
//! young metric series.

use crate::config::MetaConfig;
use crate::error::{Error, Result};
use crate::model::{
    Anomaly, AlertSeverity, AlertState, MetaAlert, MetricConfig, MetricObservation, Trend,
    TrendConfidence, TrendDirection,
};
use crate::stats::{linear_fit, mean, sample_std};
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Minimum samples for a trend fit
const MIN_TREND_SAMPLES: usize = 10;
/// Minimum baseline samples for anomaly detection
const MIN_BASELINE_SAMPLES: usize = 30;
/// Significance ratio above which a slope rejects the null (about 95% CI)
const SIGNIFICANCE_THRESHOLD: f64 = 2.0;
/// Daily decline in average confidence that raises an alert
const CONFIDENCE_DECLINE_PER_DAY: f64 = -0.02;
/// Window for the sustained-decline check; short enough that a two-day
/// slide is not averaged away by a week of flat history
const CONFIDENCE_TREND_HOURS: i64 = 48;

/// Metrics the periodic check always looks at.
const MONITORED_METRICS: &[&str] = &["avg_confidence", "contradiction_rate", "validation_velocity"];

/// Result of one `check_alerts` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// True when the series is too young and only the bootstrap alert fired
    pub bootstrap: bool,
    pub alerts: Vec<MetaAlert>,
}

/// The meta-observer engine. The only component that writes `meta_alerts`.
pub struct MetaObserver<S> {
    store: S,
    config: MetaConfig,
}

impl<S: AsRef<dyn Store>> MetaObserver<S> {
    pub fn new(store: S, config: MetaConfig) -> Self {
        Self { store, config }
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Record one metric observation at the current instant.
    pub async fn record_metric(
        &self,
        metric_name: &str,
        value: f64,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.record_metric_at(metric_name, value, Utc::now(), domain, metadata).await
    }

    /// Record an observation with an explicit timestamp (backfill, tests).
    pub async fn record_metric_at(
        &self,
        metric_name: &str,
        value: f64,
        observed_at: DateTime<Utc>,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.store().insert_metric(metric_name, value, observed_at, domain, metadata).await
    }

    /// Observations in the trailing window, ordered by `observed_at`.
    pub async fn rolling_window(
        &self,
        metric_name: &str,
        hours: i64,
        domain: Option<&str>,
    ) -> Result<Vec<MetricObservation>> {
        let now = Utc::now();
        self.store().metric_window(metric_name, now - Duration::hours(hours), now, domain).await
    }

    /// Least-squares trend over the trailing window.
    #[instrument(skip(self))]
    pub async fn calculate_trend(
        &self,
        metric_name: &str,
        hours: i64,
        domain: Option<&str>,
    ) -> Result<Trend> {
        let observations = self.rolling_window(metric_name, hours, domain).await?;
        if observations.len() < MIN_TREND_SAMPLES {
            return Ok(Trend {
                direction: TrendDirection::Stable,
                slope: 0.0,
                confidence: TrendConfidence::Low,
                sample_count: observations.len(),
                reason: Some("insufficient_data".to_string()),
            });
        }

        let window_start = observations[0].observed_at;
        let t: Vec<f64> = observations
            .iter()
            .map(|o| (o.observed_at - window_start).num_seconds() as f64 / 3600.0)
            .collect();
        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();

        let Some((slope, _intercept, residual_std)) = linear_fit(&t, &values) else {
            return Ok(Trend {
                direction: TrendDirection::Stable,
                slope: 0.0,
                confidence: TrendConfidence::Low,
                sample_count: observations.len(),
                reason: Some("degenerate_fit".to_string()),
            });
        };

        // Reject the null slope when |slope| * sqrt(n) / sigma_residual > 2
        let n_sqrt = (observations.len() as f64).sqrt();
        let (significant, ratio) = if residual_std > 0.0 {
            let ratio = slope.abs() * n_sqrt / residual_std;
            (ratio > SIGNIFICANCE_THRESHOLD, ratio)
        } else {
            (slope.abs() > 0.0, f64::INFINITY)
        };

        let (direction, confidence) = if !significant {
            (TrendDirection::Stable, TrendConfidence::Medium)
        } else {
            let direction = if slope > 0.0 {
                TrendDirection::Increasing
            } else {
                TrendDirection::Decreasing
            };
            let confidence = if ratio > 2.0 * SIGNIFICANCE_THRESHOLD {
                TrendConfidence::High
            } else {
                TrendConfidence::Medium
            };
            (direction, confidence)
        };

        Ok(Trend {
            direction,
            slope,
            confidence,
            sample_count: observations.len(),
            reason: None,
        })
    }

    /// Z-score anomaly: compare the current window's mean against the
    /// preceding baseline window.
    #[instrument(skip(self))]
    pub async fn detect_anomaly(
        &self,
        metric_name: &str,
        baseline_hours: i64,
        current_hours: i64,
        domain: Option<&str>,
    ) -> Result<Anomaly> {
        let now = Utc::now();
        let baseline = self
            .store()
            .metric_window(
                metric_name,
                now - Duration::hours(baseline_hours),
                now - Duration::hours(current_hours),
                domain,
            )
            .await?;
        if baseline.len() < MIN_BASELINE_SAMPLES {
            return Ok(Anomaly {
                is_anomaly: false,
                z_score: None,
                severity: None,
                baseline_mean: None,
                baseline_std: None,
                current_mean: None,
                reason: Some("insufficient_baseline".to_string()),
            });
        }

        let current = self
            .store()
            .metric_window(metric_name, now - Duration::hours(current_hours), now, domain)
            .await?;
        if current.is_empty() {
            return Ok(Anomaly {
                is_anomaly: false,
                z_score: None,
                severity: None,
                baseline_mean: None,
                baseline_std: None,
                current_mean: None,
                reason: Some("no_current_observations".to_string()),
            });
        }

        let baseline_values: Vec<f64> = baseline.iter().map(|o| o.value).collect();
        let current_values: Vec<f64> = current.iter().map(|o| o.value).collect();
        let baseline_mean = mean(&baseline_values);
        let baseline_std = sample_std(&baseline_values);
        let current_mean = mean(&current_values);

        if baseline_std == 0.0 {
            return Ok(Anomaly {
                is_anomaly: false,
                z_score: None,
                severity: None,
                baseline_mean: Some(baseline_mean),
                baseline_std: Some(0.0),
                current_mean: Some(current_mean),
                reason: Some("zero_baseline_variance".to_string()),
            });
        }

        let z = (current_mean - baseline_mean) / baseline_std;
        let severity = if z.abs() > 4.0 {
            Some(AlertSeverity::Critical)
        } else if z.abs() > self.config.z_score_threshold {
            Some(AlertSeverity::Warning)
        } else {
            None
        };

        Ok(Anomaly {
            is_anomaly: severity.is_some(),
            z_score: Some(z),
            severity,
            baseline_mean: Some(baseline_mean),
            baseline_std: Some(baseline_std),
            current_mean: Some(current_mean),
            reason: None,
        })
    }

    /// Upsert an alert keyed on `(alert_type, metric_name)` among unresolved
    /// rows: refresh the existing one, or insert in state `new`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        metric_name: Option<&str>,
        current_value: Option<f64>,
        baseline_value: Option<f64>,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<MetaAlert> {
        if let Some(existing) =
            self.store().find_unresolved_alert(alert_type, metric_name).await?
        {
            self.store().touch_alert(existing.id, message).await?;
            return self
                .store()
                .get_alert(existing.id)
                .await?
                .ok_or_else(|| Error::Internal(format!("alert {} vanished", existing.id)));
        }
        let alert = self
            .store()
            .insert_alert(
                alert_type,
                severity,
                metric_name,
                current_value,
                baseline_value,
                message,
                context,
            )
            .await?;
        info!(alert_type, severity = severity.as_str(), "Created meta-alert");
        Ok(alert)
    }

    /// `new | active -> ack`.
    pub async fn acknowledge_alert(&self, alert_id: i64) -> Result<bool> {
        self.store().set_alert_state(alert_id, AlertState::Ack).await
    }

    /// Any non-terminal state -> `resolved`.
    pub async fn resolve_alert(&self, alert_id: i64) -> Result<bool> {
        self.store().set_alert_state(alert_id, AlertState::Resolved).await
    }

    pub async fn active_alerts(&self, severity: Option<AlertSeverity>) -> Result<Vec<MetaAlert>> {
        self.store().list_active_alerts(severity).await
    }

    /// Record a human true/false-positive label for an alert, feeding the
    /// per-metric FPR counters.
    pub async fn record_alert_outcome(
        &self,
        alert_id: i64,
        is_true_positive: bool,
    ) -> Result<()> {
        let alert = self
            .store()
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("alert {alert_id}")))?;
        let Some(metric_name) = alert.metric_name.as_deref() else {
            return Ok(());
        };
        self.store().record_alert_outcome(metric_name, is_true_positive).await
    }

    /// Per-metric detector configs with their outcome counters.
    pub async fn fpr_stats(&self) -> Result<Vec<MetricConfig>> {
        self.store().list_metric_configs().await
    }

    /// Refresh hourly rollups covering the last two days of observations.
    pub async fn rollup(&self) -> Result<u64> {
        self.store().refresh_hourly_rollups(Utc::now() - Duration::hours(48)).await
    }

    /// Evaluate alert conditions over the monitored metrics.
    ///
    /// While the series is younger than the bootstrap window, a single
    /// `bootstrap` alert is returned and nothing else fires.
    #[instrument(skip(self))]
    pub async fn check_alerts(&self) -> Result<CheckOutcome> {
        let now = Utc::now();

        // Bootstrap gate: series age across the monitored metrics
        let mut earliest: Option<DateTime<Utc>> = None;
        for metric in MONITORED_METRICS {
            if let Some(first) = self.store().earliest_observation(metric, None).await? {
                earliest = Some(earliest.map_or(first, |e| e.min(first)));
            }
        }
        let series_age_days =
            earliest.map(|first| (now - first).num_seconds() as f64 / 86_400.0);
        if series_age_days.is_none_or(|age| age < self.config.bootstrap_days as f64) {
            let alert = self
                .create_alert(
                    "bootstrap",
                    AlertSeverity::Info,
                    None,
                    None,
                    None,
                    "Metric history too young for alerting; collecting baseline data",
                    None,
                )
                .await?;
            return Ok(CheckOutcome { bootstrap: true, alerts: vec![alert] });
        }

        let mut alerts = Vec::new();

        // Confidence decline: sustained negative trend on avg_confidence
        let trend =
            self.calculate_trend("avg_confidence", CONFIDENCE_TREND_HOURS, None).await?;
        if trend.direction == TrendDirection::Decreasing
            && trend.slope * 24.0 <= CONFIDENCE_DECLINE_PER_DAY
        {
            let alert = self
                .create_alert(
                    "confidence_decline",
                    AlertSeverity::Warning,
                    Some("avg_confidence"),
                    None,
                    None,
                    &format!(
                        "Average confidence declining at {:.3}/day over the last {CONFIDENCE_TREND_HOURS}h",
                        trend.slope * 24.0
                    ),
                    None,
                )
                .await?;
            alerts.push(alert);
        }

        // Z-score anomalies per monitored metric
        let mut metric_names: Vec<String> =
            MONITORED_METRICS.iter().map(|m| (*m).to_string()).collect();
        for name in self
            .store()
            .list_metric_names(now - Duration::hours(self.config.baseline_window_hours))
            .await?
        {
            if !metric_names.contains(&name) {
                metric_names.push(name);
            }
        }

        for metric in &metric_names {
            self.store().ensure_metric_config(metric).await?;
            let anomaly = self
                .detect_anomaly(
                    metric,
                    self.config.baseline_window_hours,
                    self.config.current_window_hours,
                    None,
                )
                .await?;
            if !anomaly.is_anomaly {
                continue;
            }
            let alert_type = if metric.as_str() == "contradiction_rate" {
                "contradiction_spike".to_string()
            } else {
                format!("{metric}_anomaly")
            };
            let severity = anomaly.severity.unwrap_or(AlertSeverity::Warning);
            let alert = self
                .create_alert(
                    &alert_type,
                    severity,
                    Some(metric),
                    anomaly.current_mean,
                    anomaly.baseline_mean,
                    &format!(
                        "{metric} at {:.4} deviates {:.1} sigma from baseline {:.4}",
                        anomaly.current_mean.unwrap_or_default(),
                        anomaly.z_score.unwrap_or_default(),
                        anomaly.baseline_mean.unwrap_or_default()
                    ),
                    None,
                )
                .await?;
            alerts.push(alert);
        }

        // Detectors drifting past the FPR tolerance surface a config warning
        for config in self.store().list_metric_configs().await? {
            if let Some(fpr) = config.false_positive_rate() {
                if fpr > self.config.fpr_tolerance {
                    let alert = self
                        .create_alert(
                            "detector_fpr",
                            AlertSeverity::Warning,
                            Some(&config.metric_name),
                            Some(fpr),
                            Some(self.config.fpr_tolerance),
                            &format!(
                                "Detector for '{}' has a false-positive rate of {:.0}%",
                                config.metric_name,
                                fpr * 100.0
                            ),
                            None,
                        )
                        .await?;
                    alerts.push(alert);
                }
            }
        }

        debug!(alerts = alerts.len(), "Alert check complete");
        Ok(CheckOutcome { bootstrap: false, alerts })
    }
}
