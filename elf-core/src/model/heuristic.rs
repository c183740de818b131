use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a heuristic came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Failure,
    Success,
    Observation,
    AutoDistilled,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Failure => "failure",
            SourceType::Success => "success",
            SourceType::Observation => "observation",
            SourceType::AutoDistilled => "auto_distilled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "failure" => Some(SourceType::Failure),
            "success" => Some(SourceType::Success),
            "observation" => Some(SourceType::Observation),
            "auto_distilled" => Some(SourceType::AutoDistilled),
            _ => None,
        }
    }
}

/// Lifecycle state of a heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicStatus {
    Active,
    Dormant,
    Quarantined,
    Evicted,
}

impl HeuristicStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HeuristicStatus::Active => "active",
            HeuristicStatus::Dormant => "dormant",
            HeuristicStatus::Quarantined => "quarantined",
            HeuristicStatus::Evicted => "evicted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(HeuristicStatus::Active),
            "dormant" => Some(HeuristicStatus::Dormant),
            "quarantined" => Some(HeuristicStatus::Quarantined),
            "evicted" => Some(HeuristicStatus::Evicted),
            _ => None,
        }
    }
}

/// An actionable rule with evolving confidence.
///
/// Confidence-bearing columns (`confidence*`, `status`, `times_*`) are only
/// ever written through the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heuristic {
    pub id: i64,
    pub domain: String,
    pub rule: String,
    pub explanation: Option<String>,
    pub source_type: Option<SourceType>,
    /// Weak reference to a learning or pattern, never a DB foreign key
    pub source_id: Option<i64>,
    pub confidence: f64,
    pub confidence_ema: Option<f64>,
    pub ema_alpha: Option<f64>,
    pub ema_warmup_remaining: i64,
    pub times_validated: i64,
    pub times_violated: i64,
    pub times_contradicted: i64,
    pub times_revived: i64,
    pub is_golden: bool,
    pub status: HeuristicStatus,
    pub dormant_since: Option<DateTime<Utc>>,
    /// Space-separated trigger tokens checked for revival
    pub revival_conditions: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_confidence_update: Option<DateTime<Utc>>,
    pub update_count_today: i64,
    pub update_count_reset_date: Option<NaiveDate>,
    pub min_applications: i64,
    pub fraud_flags: i64,
    pub is_quarantined: bool,
    pub last_fraud_check: Option<DateTime<Utc>>,
    /// NULL = globally visible; otherwise visible only from this path
    pub project_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Heuristic {
    /// Total recorded applications (validations + violations + contradictions).
    pub fn total_applications(&self) -> i64 {
        self.times_validated + self.times_violated + self.times_contradicted
    }

    /// Fraction of applications that validated the rule, if any exist.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total_applications();
        if total == 0 {
            None
        } else {
            Some(self.times_validated as f64 / total as f64)
        }
    }

    /// Location-scoping rule: a row is visible iff it is global or pinned to
    /// the caller's current location.
    pub fn visible_from(&self, current_location: Option<&str>) -> bool {
        match (&self.project_path, current_location) {
            (None, _) => true,
            (Some(path), Some(loc)) => path == loc,
            (Some(_), None) => false,
        }
    }
}

/// Parameters for creating a heuristic through the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHeuristic {
    pub domain: String,
    pub rule: String,
    pub explanation: Option<String>,
    pub source_type: SourceType,
    pub source_id: Option<i64>,
    pub confidence: f64,
    pub times_validated: i64,
    pub is_golden: bool,
    pub project_path: Option<String>,
}

/// Classified events that move a heuristic's confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Success,
    Failure,
    Contradiction,
    Revival,
    Decay,
    Manual,
}

impl UpdateType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateType::Success => "success",
            UpdateType::Failure => "failure",
            UpdateType::Contradiction => "contradiction",
            UpdateType::Revival => "revival",
            UpdateType::Decay => "decay",
            UpdateType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(UpdateType::Success),
            "failure" => Some(UpdateType::Failure),
            "contradiction" => Some(UpdateType::Contradiction),
            "revival" => Some(UpdateType::Revival),
            "decay" => Some(UpdateType::Decay),
            "manual" => Some(UpdateType::Manual),
            _ => None,
        }
    }
}

/// Append-only audit row for every confidence mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceUpdate {
    pub id: i64,
    pub heuristic_id: i64,
    pub old_confidence: f64,
    pub new_confidence: f64,
    pub delta: f64,
    pub update_type: UpdateType,
    pub reason: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub rate_limited: bool,
    pub raw_target_confidence: Option<f64>,
    pub smoothed_delta: Option<f64>,
    pub alpha_used: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Heuristic {
        Heuristic {
            id: 1,
            domain: "git".into(),
            rule: "Run the test suite before committing".into(),
            explanation: None,
            source_type: Some(SourceType::Observation),
            source_id: None,
            confidence: 0.7,
            confidence_ema: Some(0.7),
            ema_alpha: Some(0.3),
            ema_warmup_remaining: 0,
            times_validated: 8,
            times_violated: 2,
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

    #[test]
    fn success_rate_over_all_applications() {
        let h = sample();
        assert_eq!(h.total_applications(), 10);
        assert!((h.success_rate().unwrap() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn location_scoping_visibility() {
        let mut h = sample();
        assert!(h.visible_from(Some("/x")));
        assert!(h.visible_from(None));

        h.project_path = Some("/x".into());
        assert!(h.visible_from(Some("/x")));
        assert!(!h.visible_from(Some("/y")));
        assert!(!h.visible_from(None));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            HeuristicStatus::Active,
            HeuristicStatus::Dormant,
            HeuristicStatus::Quarantined,
            HeuristicStatus::Evicted,
        ] {
            assert_eq!(HeuristicStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(HeuristicStatus::parse("unknown"), None);
    }
}
