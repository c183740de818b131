//! The three anomaly detectors, as pure functions over fetched data.
//!
//! Each returns `None` when its preconditions are unmet or the behavior
//! looks natural; a `Some` signal always carries a normalized score and the
//! evidence blob that is persisted with it.

use crate::config::FraudConfig;
use crate::model::{AnomalySignal, ConfidenceUpdate, DomainBaseline, Heuristic, SignalSeverity};
use crate::stats::{mean, sample_std, sample_variance};
use chrono::Timelike;
use serde_json::json;

/// Expected fraction of timestamps landing in the midnight hours {23, 0, 1}
const EXPECTED_MIDNIGHT_RATE: f64 = 3.0 / 24.0;
/// Daily confidence growth at which the slope sub-signal saturates
const SLOPE_SATURATION_PER_DAY: f64 = 0.02;

/// Detector A: success rate z-score against the domain baseline.
pub fn success_rate_anomaly(
    heuristic: &Heuristic,
    baseline: Option<&DomainBaseline>,
    config: &FraudConfig,
) -> Option<AnomalySignal> {
    let total = heuristic.total_applications();
    if total < config.min_applications {
        return None;
    }
    let baseline = baseline?;
    if baseline.sample_count < 3 || baseline.std_success_rate <= 0.0 {
        return None;
    }

    let success_rate = heuristic.times_validated as f64 / total as f64;
    let z = (success_rate - baseline.avg_success_rate) / baseline.std_success_rate;
    if z <= config.success_rate_z_threshold {
        return None;
    }

    let severity = if z > 3.5 { SignalSeverity::High } else { SignalSeverity::Medium };
    Some(AnomalySignal {
        detector_name: "success_rate_anomaly".to_string(),
        score: (z / 5.0).min(1.0),
        severity,
        reason: format!(
            "Success rate {:.1}% is {z:.1} sigma above domain average {:.1}%",
            success_rate * 100.0,
            baseline.avg_success_rate * 100.0
        ),
        evidence: json!({
            "success_rate": success_rate,
            "domain_avg": baseline.avg_success_rate,
            "domain_std": baseline.std_success_rate,
            "z_score": z,
            "total_applications": total,
        }),
    })
}

/// Detector B: timing gaming over the last 30 days of updates.
///
/// Sub-signals: clustering at the cooldown boundary (60-65 min gaps),
/// clustering around midnight, and too-regular spacing (low coefficient of
/// variation).
pub fn temporal_manipulation(
    updates: &[ConfidenceUpdate],
    config: &FraudConfig,
) -> Option<AnomalySignal> {
    if updates.len() < config.min_updates_for_temporal {
        return None;
    }

    let intervals: Vec<f64> = updates
        .windows(2)
        .map(|pair| (pair[1].created_at - pair[0].created_at).num_seconds() as f64 / 60.0)
        .collect();
    if intervals.is_empty() {
        return None;
    }

    let cooldown_rate = intervals.iter().filter(|iv| (60.0..=65.0).contains(*iv)).count() as f64
        / intervals.len() as f64;

    let midnight_count = updates
        .iter()
        .filter(|u| matches!(u.created_at.hour(), 23 | 0 | 1))
        .count();
    let midnight_rate = midnight_count as f64 / updates.len() as f64;

    let interval_mean = mean(&intervals);
    let interval_std = sample_std(&intervals);
    let cv = if interval_mean > 0.0 { interval_std / interval_mean } else { 0.0 };
    let regularity = (1.0 - cv / 0.5).max(0.0);

    let score = 0.4 * cooldown_rate
        + 0.3 * ((midnight_rate - EXPECTED_MIDNIGHT_RATE) * 4.0).max(0.0)
        + 0.3 * regularity;

    if score < config.temporal_score_threshold {
        return None;
    }

    let severity = if score > 0.7 { SignalSeverity::High } else { SignalSeverity::Medium };
    Some(AnomalySignal {
        detector_name: "temporal_manipulation".to_string(),
        score,
        severity,
        reason: format!(
            "Suspicious timing: {:.0}% at cooldown boundary, {:.0}% at midnight, CV={cv:.2}",
            cooldown_rate * 100.0,
            midnight_rate * 100.0
        ),
        evidence: json!({
            "cooldown_cluster_rate": cooldown_rate,
            "midnight_rate": midnight_rate,
            "expected_midnight_rate": EXPECTED_MIDNIGHT_RATE,
            "coefficient_of_variation": cv,
            "total_updates": updates.len(),
            "interval_count": intervals.len(),
        }),
    })
}

/// Detector C: unnaturally smooth monotonic confidence growth over the last
/// 60 days of updates. Natural learning is noisy, plateaus, and drops.
pub fn unnatural_confidence_growth(
    updates: &[ConfidenceUpdate],
    config: &FraudConfig,
) -> Option<AnomalySignal> {
    if updates.len() < config.min_updates_for_trajectory {
        return None;
    }

    let confidences: Vec<f64> = updates.iter().map(|u| u.new_confidence).collect();
    let monotonic = confidences.windows(2).all(|pair| pair[1] >= pair[0]);

    let elapsed_days = (updates[updates.len() - 1].created_at - updates[0].created_at)
        .num_days() as f64;
    let slope = if elapsed_days > 0.0 {
        (confidences[confidences.len() - 1] - confidences[0]) / elapsed_days
    } else {
        0.0
    };

    let deltas: Vec<f64> = confidences.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let delta_variance = sample_variance(&deltas);
    let smoothness = (1.0 - delta_variance / 0.01).max(0.0);

    let monotonic_signal = if monotonic && updates.len() > 10 { 1.0 } else { 0.0 };
    let score = 0.3 * monotonic_signal
        + 0.4 * (slope / SLOPE_SATURATION_PER_DAY).min(1.0)
        + 0.3 * smoothness;

    if score < config.trajectory_score_threshold {
        return None;
    }

    Some(AnomalySignal {
        detector_name: "unnatural_confidence_growth".to_string(),
        score,
        severity: SignalSeverity::Medium,
        reason: format!(
            "Unnatural growth: monotonic={monotonic}, slope={slope:.4}/day, smoothness={smoothness:.2}"
        ),
        evidence: json!({
            "monotonic": monotonic,
            "growth_slope": slope,
            "smoothness_score": smoothness,
            "delta_variance": delta_variance,
            "total_updates": updates.len(),
            "confidence_start": confidences[0],
            "confidence_end": confidences[confidences.len() - 1],
        }),
    })
}

/// Bayesian fusion of firing signals.
///
/// Each signal contributes a likelihood ratio `P(signal|fraud) /
/// P(signal|clean)` with `0.8 * score` over `0.1 * score` (10 when the
/// denominator is zero); the prior odds are multiplied by the product.
/// Returns `(posterior_probability, combined_likelihood_ratio)`.
pub fn fuse(signals: &[AnomalySignal], prior_fraud_rate: f64) -> (f64, f64) {
    if signals.is_empty() {
        return (0.0, 1.0);
    }

    let combined_lr: f64 = signals
        .iter()
        .map(|signal| {
            let p_given_clean = 0.1 * signal.score;
            if p_given_clean > 0.0 {
                (0.8 * signal.score) / p_given_clean
            } else {
                10.0
            }
        })
        .product();

    let prior_odds = prior_fraud_rate / (1.0 - prior_fraud_rate);
    let posterior_odds = prior_odds * combined_lr;
    (posterior_odds / (1.0 + posterior_odds), combined_lr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeuristicStatus, SourceType, UpdateType};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn heuristic(validated: i64, violated: i64) -> Heuristic {
        Heuristic {
            id: 1,
            domain: "testing".into(),
            rule: "rule".into(),
            explanation: None,
            source_type: Some(SourceType::Observation),
            source_id: None,
            confidence: 0.8,
            confidence_ema: Some(0.8),
            ema_alpha: Some(0.3),
            ema_warmup_remaining: 0,
            times_validated: validated,
            times_violated: violated,
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
            project_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn baseline(avg: f64, std: f64, samples: i64) -> DomainBaseline {
        DomainBaseline {
            domain: "testing".into(),
            avg_success_rate: avg,
            std_success_rate: std,
            avg_update_frequency: 1.0,
            std_update_frequency: 0.2,
            sample_count: samples,
            last_updated: Utc::now(),
        }
    }

    fn update_at(ts: DateTime<Utc>, confidence: f64) -> ConfidenceUpdate {
        ConfidenceUpdate {
            id: 0,
            heuristic_id: 1,
            old_confidence: confidence - 0.01,
            new_confidence: confidence,
            delta: 0.01,
            update_type: UpdateType::Success,
            reason: None,
            session_id: None,
            agent_id: None,
            rate_limited: false,
            raw_target_confidence: None,
            smoothed_delta: None,
            alpha_used: None,
            created_at: ts,
        }
    }

    #[test]
    fn success_rate_fires_above_two_and_a_half_sigma() {
        let config = FraudConfig::default();
        // 20/20 success against 0.65 +/- 0.05 -> z = 7
        let signal =
            success_rate_anomaly(&heuristic(20, 0), Some(&baseline(0.65, 0.05, 5)), &config)
                .unwrap();
        assert!(signal.score >= 0.99);
        assert_eq!(signal.severity, SignalSeverity::High);

        // at the domain average: nothing fires
        assert!(
            success_rate_anomaly(&heuristic(13, 7), Some(&baseline(0.65, 0.05, 5)), &config)
                .is_none()
        );
    }

    #[test]
    fn success_rate_preconditions_gate_the_detector() {
        let config = FraudConfig::default();
        // too few applications
        assert!(
            success_rate_anomaly(&heuristic(5, 0), Some(&baseline(0.5, 0.05, 5)), &config)
                .is_none()
        );
        // missing baseline
        assert!(success_rate_anomaly(&heuristic(20, 0), None, &config).is_none());
        // undersampled baseline
        assert!(
            success_rate_anomaly(&heuristic(20, 0), Some(&baseline(0.5, 0.05, 2)), &config)
                .is_none()
        );
        // zero variance
        assert!(
            success_rate_anomaly(&heuristic(20, 0), Some(&baseline(0.5, 0.0, 5)), &config)
                .is_none()
        );
    }

    #[test]
    fn metronomic_hourly_updates_look_manipulated() {
        let config = FraudConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 6, 20, 9, 0, 0).unwrap();
        // updates every 62 minutes exactly: cooldown-boundary and perfectly regular
        let updates: Vec<ConfidenceUpdate> =
            (0..12).map(|i| update_at(start + Duration::minutes(62 * i), 0.5)).collect();

        let signal = temporal_manipulation(&updates, &config).unwrap();
        assert!(signal.score >= 0.5);
        assert_eq!(signal.detector_name, "temporal_manipulation");
    }

    #[test]
    fn irregular_daytime_updates_pass() {
        let config = FraudConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 6, 20, 9, 0, 0).unwrap();
        let gaps = [200i64, 1400, 90, 2750, 505, 1330, 95, 3000];
        let mut ts = start;
        let mut updates = Vec::new();
        for gap in gaps {
            updates.push(update_at(ts, 0.5));
            ts += Duration::minutes(gap);
        }
        assert!(temporal_manipulation(&updates, &config).is_none());
    }

    #[test]
    fn smooth_monotonic_climb_is_unnatural() {
        let config = FraudConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        // +0.02/day, perfectly smooth, never drops
        let updates: Vec<ConfidenceUpdate> = (0..15)
            .map(|i| update_at(start + Duration::days(i), 0.4 + 0.02 * i as f64))
            .collect();

        let signal = unnatural_confidence_growth(&updates, &config).unwrap();
        assert!(signal.score >= 0.5);
    }

    #[test]
    fn noisy_trajectory_with_drops_passes() {
        let config = FraudConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let values = [0.5, 0.55, 0.4, 0.6, 0.45, 0.7, 0.5, 0.65, 0.35, 0.6, 0.5, 0.62];
        let updates: Vec<ConfidenceUpdate> = values
            .iter()
            .enumerate()
            .map(|(i, v)| update_at(start + Duration::days(i as i64 * 4), *v))
            .collect();
        assert!(unnatural_confidence_growth(&updates, &config).is_none());
    }

    #[test]
    fn fusion_with_no_signals_is_clean() {
        let (posterior, lr) = fuse(&[], 0.05);
        assert_eq!(posterior, 0.0);
        assert!((lr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fusion_compounds_likelihood_ratios() {
        let signal = AnomalySignal {
            detector_name: "test".into(),
            score: 0.8,
            severity: SignalSeverity::Medium,
            reason: String::new(),
            evidence: serde_json::Value::Null,
        };
        // One signal: LR = 8, prior odds 0.05/0.95
        let (one, lr_one) = fuse(std::slice::from_ref(&signal), 0.05);
        assert!((lr_one - 8.0).abs() < 1e-9);
        let expected_one = (8.0 * 0.05 / 0.95) / (1.0 + 8.0 * 0.05 / 0.95);
        assert!((one - expected_one).abs() < 1e-9);

        // Two signals: LR = 64, posterior well above fraud_likely
        let (two, lr_two) = fuse(&[signal.clone(), signal], 0.05);
        assert!((lr_two - 64.0).abs() < 1e-9);
        assert!(two > 0.7);
        assert!(two > one);
    }
}
