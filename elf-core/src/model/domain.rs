use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capacity state of a domain under the two-tier elastic limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    Normal,
    Overflow,
    Critical,
}

impl DomainState {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainState::Normal => "normal",
            DomainState::Overflow => "overflow",
            DomainState::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(DomainState::Normal),
            "overflow" => Some(DomainState::Overflow),
            "critical" => Some(DomainState::Critical),
            _ => None,
        }
    }

    /// Derive the state from an active count against the effective limits.
    pub fn from_count(count: i64, soft_limit: i64, hard_limit: i64) -> Self {
        if count > hard_limit {
            DomainState::Critical
        } else if count > soft_limit {
            DomainState::Overflow
        } else {
            DomainState::Normal
        }
    }
}

/// Per-domain capacity bookkeeping, kept consistent with the active
/// heuristic population by schema triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub domain: String,
    pub soft_limit: i64,
    pub hard_limit: i64,
    /// NULL, or a CEO-raised effective hard cap (>= hard_limit)
    pub ceo_override_limit: Option<i64>,
    pub current_count: i64,
    pub state: DomainState,
    pub overflow_entered_at: Option<DateTime<Utc>>,
    pub expansion_min_confidence: f64,
    pub expansion_min_validations: i64,
    pub expansion_min_novelty: f64,
    pub grace_period_days: i64,
    pub max_overflow_days: i64,
    pub avg_confidence: Option<f64>,
    pub health_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainMetadata {
    /// The hard cap currently in force, honoring a CEO override.
    pub fn effective_hard_limit(&self) -> i64 {
        self.ceo_override_limit.unwrap_or(self.hard_limit).max(self.hard_limit)
    }

    /// Days spent in overflow relative to `now`, if the domain is over its
    /// soft cap.
    pub fn overflow_days(&self, now: DateTime<Utc>) -> Option<f64> {
        self.overflow_entered_at
            .map(|entered| (now - entered).num_seconds() as f64 / 86_400.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_derivation_matches_limits() {
        assert_eq!(DomainState::from_count(5, 5, 10), DomainState::Normal);
        assert_eq!(DomainState::from_count(6, 5, 10), DomainState::Overflow);
        assert_eq!(DomainState::from_count(10, 5, 10), DomainState::Overflow);
        assert_eq!(DomainState::from_count(11, 5, 10), DomainState::Critical);
    }

    #[test]
    fn ceo_override_never_lowers_the_hard_cap() {
        let mut meta = DomainMetadata {
            domain: "auth".into(),
            soft_limit: 5,
            hard_limit: 10,
            ceo_override_limit: None,
            current_count: 0,
            state: DomainState::Normal,
            overflow_entered_at: None,
            expansion_min_confidence: 0.70,
            expansion_min_validations: 3,
            expansion_min_novelty: 0.60,
            grace_period_days: 7,
            max_overflow_days: 28,
            avg_confidence: None,
            health_score: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(meta.effective_hard_limit(), 10);
        meta.ceo_override_limit = Some(15);
        assert_eq!(meta.effective_hard_limit(), 15);
    }
}
