//! EMA-smoothed confidence transitions.
//!
//! The planner is pure: it takes the heuristic's current state and produces
//! the column values plus the audit row for one typed event. Persistence
//! happens in one transaction via the store.

use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::model::{Heuristic, HeuristicStatus, UpdateType};
use crate::storage::{ConfidenceTransition, NewConfidenceUpdate};
use chrono::{DateTime, Utc};

/// Confidence deltas per event class
const SUCCESS_STEP: f64 = 0.05;
const FAILURE_STEP: f64 = 0.05;
const CONTRADICTION_STEP: f64 = 0.15;

/// Caller-supplied context for one update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub event: UpdateType,
    pub reason: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl Default for UpdateRequest {
    fn default() -> Self {
        Self { event: UpdateType::Success, reason: None, session_id: None, agent_id: None }
    }
}

/// Planned outcome of a confidence update, ready to persist.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub transition: ConfidenceTransition,
    pub audit: NewConfidenceUpdate,
}

/// Compute the raw target confidence for an event class.
fn raw_target(confidence: f64, event: UpdateType) -> Result<f64> {
    match event {
        UpdateType::Success => Ok((confidence + SUCCESS_STEP).min(1.0)),
        UpdateType::Failure => Ok((confidence - FAILURE_STEP).max(0.0)),
        UpdateType::Contradiction => Ok((confidence - CONTRADICTION_STEP).max(0.0)),
        UpdateType::Revival | UpdateType::Decay | UpdateType::Manual => Err(Error::Validation(
            format!("'{}' is not a caller-driven confidence event", event.as_str()),
        )),
    }
}

/// Plan one EMA-smoothed confidence update.
///
/// Smoothing: during warmup `alpha = 1.0` (unsmoothed); afterward the row's
/// `ema_alpha` (or the configured default). Rate limiting: at most one
/// non-manual update per UTC calendar day may increase confidence; further
/// same-day increases are applied clipped to no-increase and flagged
/// `rate_limited`, with counters still moving.
pub fn plan_update(
    heuristic: &Heuristic,
    request: &UpdateRequest,
    config: &LifecycleConfig,
    now: DateTime<Utc>,
) -> Result<UpdatePlan> {
    let target = raw_target(heuristic.confidence, request.event)?;

    let warmup_remaining = heuristic.ema_warmup_remaining.max(0);
    let alpha = if warmup_remaining > 0 {
        1.0
    } else {
        heuristic.ema_alpha.unwrap_or(config.ema_alpha)
    };

    let previous_ema = heuristic.confidence_ema.unwrap_or(heuristic.confidence);
    let smoothed = (alpha * target + (1.0 - alpha) * previous_ema).clamp(0.0, 1.0);
    let smoothed_delta = smoothed - heuristic.confidence;

    // UTC-day rate limit bookkeeping
    let today = now.date_naive();
    let count_today = if heuristic.update_count_reset_date == Some(today) {
        heuristic.update_count_today
    } else {
        0
    };

    let would_increase = smoothed > heuristic.confidence;
    let rate_limited = would_increase && count_today >= 1;
    let new_confidence =
        if rate_limited { smoothed.min(heuristic.confidence) } else { smoothed };

    let mut times_validated = heuristic.times_validated;
    let mut times_violated = heuristic.times_violated;
    let mut times_contradicted = heuristic.times_contradicted;
    match request.event {
        UpdateType::Success => times_validated += 1,
        UpdateType::Failure => times_violated += 1,
        UpdateType::Contradiction => times_contradicted += 1,
        _ => {}
    }

    // Dormancy check against the post-update state
    let applications = times_validated + times_violated;
    let goes_dormant = heuristic.status == HeuristicStatus::Active
        && new_confidence < config.dormancy_threshold
        && applications >= heuristic.min_applications;
    let (status, dormant_since) = if goes_dormant {
        (HeuristicStatus::Dormant, Some(now))
    } else {
        (heuristic.status, heuristic.dormant_since)
    };

    let transition = ConfidenceTransition {
        confidence: new_confidence,
        confidence_ema: Some(new_confidence),
        ema_warmup_remaining: (warmup_remaining - 1).max(0),
        times_validated,
        times_violated,
        times_contradicted,
        times_revived: heuristic.times_revived,
        status,
        dormant_since,
        last_used_at: Some(now),
        last_confidence_update: Some(now),
        update_count_today: count_today + 1,
        update_count_reset_date: Some(today),
    };

    let audit = NewConfidenceUpdate {
        old_confidence: heuristic.confidence,
        new_confidence,
        delta: new_confidence - heuristic.confidence,
        update_type: request.event,
        reason: request.reason.clone(),
        session_id: request.session_id.clone(),
        agent_id: request.agent_id.clone(),
        rate_limited,
        raw_target_confidence: Some(target),
        smoothed_delta: Some(smoothed_delta),
        alpha_used: Some(alpha),
    };

    Ok(UpdatePlan { transition, audit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn heuristic(confidence: f64, warmup: i64) -> Heuristic {
        Heuristic {
            id: 1,
            domain: "testing".into(),
            rule: "Mock at boundaries".into(),
            explanation: None,
            source_type: None,
            source_id: None,
            confidence,
            confidence_ema: Some(confidence),
            ema_alpha: Some(0.3),
            ema_warmup_remaining: warmup,
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
            project_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(event: UpdateType) -> UpdateRequest {
        UpdateRequest { event, ..UpdateRequest::default() }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn warmup_updates_are_unsmoothed() {
        let h = heuristic(0.5, 3);
        let plan =
            plan_update(&h, &request(UpdateType::Success), &LifecycleConfig::default(), now())
                .unwrap();
        // alpha = 1.0 during warmup: confidence jumps straight to the target
        assert!((plan.transition.confidence - 0.55).abs() < 1e-12);
        assert_eq!(plan.audit.alpha_used, Some(1.0));
        assert_eq!(plan.transition.ema_warmup_remaining, 2);
    }

    #[test]
    fn post_warmup_updates_are_smoothed() {
        let h = heuristic(0.5, 0);
        let plan =
            plan_update(&h, &request(UpdateType::Success), &LifecycleConfig::default(), now())
                .unwrap();
        // ema' = 0.3 * 0.55 + 0.7 * 0.5 = 0.515
        assert!((plan.transition.confidence - 0.515).abs() < 1e-12);
        assert_eq!(plan.audit.alpha_used, Some(0.3));
        assert_eq!(plan.audit.raw_target_confidence, Some(0.55));
    }

    #[test]
    fn contradiction_drops_harder_than_failure() {
        let h = heuristic(0.5, 3);
        let failure =
            plan_update(&h, &request(UpdateType::Failure), &LifecycleConfig::default(), now())
                .unwrap();
        let contradiction = plan_update(
            &h,
            &request(UpdateType::Contradiction),
            &LifecycleConfig::default(),
            now(),
        )
        .unwrap();
        assert!((failure.transition.confidence - 0.45).abs() < 1e-12);
        assert!((contradiction.transition.confidence - 0.35).abs() < 1e-12);
        assert_eq!(contradiction.transition.times_contradicted, 1);
    }

    #[test]
    fn second_same_day_increase_is_clipped_and_flagged() {
        let mut h = heuristic(0.5, 3);
        h.update_count_today = 1;
        h.update_count_reset_date = Some(now().date_naive());

        let plan =
            plan_update(&h, &request(UpdateType::Success), &LifecycleConfig::default(), now())
                .unwrap();
        assert!(plan.audit.rate_limited);
        // clipped to no-increase, counters still move
        assert!((plan.transition.confidence - 0.5).abs() < 1e-12);
        assert_eq!(plan.audit.delta, 0.0);
        assert_eq!(plan.transition.times_validated, 1);
        assert_eq!(plan.transition.update_count_today, 2);
    }

    #[test]
    fn day_roll_resets_the_rate_limit() {
        let mut h = heuristic(0.5, 3);
        h.update_count_today = 4;
        h.update_count_reset_date = Some(now().date_naive().pred_opt().unwrap());

        let plan =
            plan_update(&h, &request(UpdateType::Success), &LifecycleConfig::default(), now())
                .unwrap();
        assert!(!plan.audit.rate_limited);
        assert_eq!(plan.transition.update_count_today, 1);
        assert_eq!(plan.transition.update_count_reset_date, Some(now().date_naive()));
    }

    #[test]
    fn decreases_are_never_rate_limited() {
        let mut h = heuristic(0.5, 3);
        h.update_count_today = 3;
        h.update_count_reset_date = Some(now().date_naive());

        let plan =
            plan_update(&h, &request(UpdateType::Failure), &LifecycleConfig::default(), now())
                .unwrap();
        assert!(!plan.audit.rate_limited);
        assert!(plan.transition.confidence < 0.5);
    }

    #[test]
    fn low_confidence_with_enough_applications_goes_dormant() {
        let mut h = heuristic(0.20, 0);
        h.times_validated = 3;
        h.times_violated = 7;

        let plan =
            plan_update(&h, &request(UpdateType::Failure), &LifecycleConfig::default(), now())
                .unwrap();
        // 0.3 * 0.15 + 0.7 * 0.20 = 0.185, below the 0.20 floor with 11 applications
        assert_eq!(plan.transition.status, HeuristicStatus::Dormant);
        assert!(plan.transition.dormant_since.is_some());
    }

    #[test]
    fn too_few_applications_never_dorm() {
        let mut h = heuristic(0.20, 0);
        h.times_validated = 1;
        h.times_violated = 2;

        let plan =
            plan_update(&h, &request(UpdateType::Failure), &LifecycleConfig::default(), now())
                .unwrap();
        assert_eq!(plan.transition.status, HeuristicStatus::Active);
    }

    #[test]
    fn delta_always_equals_new_minus_old() {
        let h = heuristic(0.73, 0);
        for event in [UpdateType::Success, UpdateType::Failure, UpdateType::Contradiction] {
            let plan =
                plan_update(&h, &request(event), &LifecycleConfig::default(), now()).unwrap();
            let expected = plan.audit.new_confidence - plan.audit.old_confidence;
            assert!((plan.audit.delta - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn bounds_hold_at_the_edges() {
        let high = heuristic(1.0, 3);
        let plan =
            plan_update(&high, &request(UpdateType::Success), &LifecycleConfig::default(), now())
                .unwrap();
        assert!(plan.transition.confidence <= 1.0);

        let low = heuristic(0.0, 3);
        let plan = plan_update(
            &low,
            &request(UpdateType::Contradiction),
            &LifecycleConfig::default(),
            now(),
        )
        .unwrap();
        assert!(plan.transition.confidence >= 0.0);
    }

    #[test]
    fn scheduler_events_are_rejected() {
        let h = heuristic(0.5, 0);
        for event in [UpdateType::Revival, UpdateType::Decay, UpdateType::Manual] {
            assert!(plan_update(&h, &request(event), &LifecycleConfig::default(), now()).is_err());
        }
    }
}
