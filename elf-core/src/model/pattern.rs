use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pattern kinds the observer extracts from session logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Retry,
    Error,
    Search,
    SuccessSequence,
    ToolSequence,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Retry => "retry",
            PatternKind::Error => "error",
            PatternKind::Search => "search",
            PatternKind::SuccessSequence => "success_sequence",
            PatternKind::ToolSequence => "tool_sequence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "retry" => Some(PatternKind::Retry),
            "error" => Some(PatternKind::Error),
            "search" => Some(PatternKind::Search),
            "success_sequence" => Some(PatternKind::SuccessSequence),
            "tool_sequence" => Some(PatternKind::ToolSequence),
            _ => None,
        }
    }

    /// Initial-strength multiplier per kind. Retries and success chains are
    /// more actionable than search or ordering patterns.
    pub fn strength_multiplier(self) -> f64 {
        match self {
            PatternKind::Retry => 1.2,
            PatternKind::Error => 1.0,
            PatternKind::SuccessSequence => 1.3,
            PatternKind::Search => 0.8,
            PatternKind::ToolSequence => 0.9,
        }
    }
}

/// Promotion thresholds (strength, occurrences, age, session diversity)
pub const PROMOTION_MIN_STRENGTH: f64 = 0.7;
pub const PROMOTION_MIN_OCCURRENCES: i64 = 3;
pub const PROMOTION_MIN_AGE_DAYS: f64 = 1.0;
pub const PROMOTION_MIN_SESSIONS: usize = 2;

/// A proto-heuristic observed in session logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub kind: PatternKind,
    pub pattern_text: String,
    /// Normalized key the dedup hash is derived from
    pub signature: String,
    /// First 16 hex chars of sha256("type:signature"), unique
    pub pattern_hash: String,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Capped at the last 10 distinct sessions
    pub session_ids: Vec<String>,
    pub domain: String,
    pub project_path: Option<String>,
    pub strength: f64,
    pub promoted_to_heuristic_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Whether this pattern currently qualifies for promotion to a heuristic.
    pub fn is_promotion_candidate(&self, now: DateTime<Utc>) -> bool {
        if self.promoted_to_heuristic_id.is_some() {
            return false;
        }
        if self.strength < PROMOTION_MIN_STRENGTH {
            return false;
        }
        if self.occurrence_count < PROMOTION_MIN_OCCURRENCES {
            return false;
        }
        let age_days = (now - self.first_seen).num_seconds() as f64 / 86_400.0;
        if age_days < PROMOTION_MIN_AGE_DAYS {
            return false;
        }
        self.session_ids.len() >= PROMOTION_MIN_SESSIONS
    }
}

/// A pattern produced by the extractor before it has been deduplicated
/// against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPattern {
    pub kind: PatternKind,
    pub pattern_text: String,
    pub signature: String,
    pub domain: String,
    pub occurrence_count: i64,
    pub session_ids: Vec<String>,
    pub project_path: Option<String>,
}

impl ExtractedPattern {
    /// Dedup key: first 16 hex chars of sha256 over `type:signature`.
    pub fn dedup_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(format!("{}:{}", self.kind.as_str(), self.signature));
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..16].to_string()
    }

    /// Initial strength for a freshly inserted pattern:
    /// `(0.3 + min(0.3, occurrences * 0.05)) * kind multiplier`, clamped.
    pub fn initial_strength(&self) -> f64 {
        let occurrence_bonus = (self.occurrence_count as f64 * 0.05).min(0.3);
        let strength = (0.3 + occurrence_bonus) * self.kind.strength_multiplier();
        strength.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn extracted(kind: PatternKind, occ: i64) -> ExtractedPattern {
        ExtractedPattern {
            kind,
            pattern_text: "When Bash fails, retry with: cargo test -- --nocapture".into(),
            signature: "Bash:cargo test".into(),
            domain: "shell".into(),
            occurrence_count: occ,
            session_ids: vec!["s1".into()],
            project_path: None,
        }
    }

    #[test]
    fn dedup_hash_is_stable_and_short() {
        let a = extracted(PatternKind::Retry, 1);
        let b = extracted(PatternKind::Retry, 5);
        // Hash depends only on kind + signature, not on counts
        assert_eq!(a.dedup_hash(), b.dedup_hash());
        assert_eq!(a.dedup_hash().len(), 16);

        let other = extracted(PatternKind::Error, 1);
        assert_ne!(a.dedup_hash(), other.dedup_hash());
    }

    #[test]
    fn initial_strength_applies_type_multiplier() {
        // retry with 1 occurrence: (0.3 + 0.05) * 1.2 = 0.42
        let retry = extracted(PatternKind::Retry, 1);
        assert!((retry.initial_strength() - 0.42).abs() < 1e-9);

        // search patterns are discounted: (0.3 + 0.05) * 0.8 = 0.28
        let search = extracted(PatternKind::Search, 1);
        assert!((search.initial_strength() - 0.28).abs() < 1e-9);

        // occurrence bonus caps at 0.3
        let many = extracted(PatternKind::Error, 100);
        assert!((many.initial_strength() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn promotion_requires_all_four_gates() {
        let now = Utc::now();
        let mut pattern = Pattern {
            id: 1,
            kind: PatternKind::Retry,
            pattern_text: "text".into(),
            signature: "sig".into(),
            pattern_hash: "abcd1234abcd1234".into(),
            occurrence_count: 5,
            first_seen: now - Duration::days(3),
            last_seen: now,
            session_ids: vec!["a".into(), "b".into()],
            domain: "shell".into(),
            project_path: None,
            strength: 0.85,
            promoted_to_heuristic_id: None,
            created_at: now,
            updated_at: now,
        };
        assert!(pattern.is_promotion_candidate(now));

        pattern.strength = 0.5;
        assert!(!pattern.is_promotion_candidate(now));
        pattern.strength = 0.85;

        pattern.occurrence_count = 2;
        assert!(!pattern.is_promotion_candidate(now));
        pattern.occurrence_count = 5;

        pattern.first_seen = now - Duration::hours(6);
        assert!(!pattern.is_promotion_candidate(now));
        pattern.first_seen = now - Duration::days(3);

        pattern.session_ids = vec!["a".into()];
        assert!(!pattern.is_promotion_candidate(now));
        pattern.session_ids = vec!["a".into(), "b".into()];

        pattern.promoted_to_heuristic_id = Some(9);
        assert!(!pattern.is_promotion_candidate(now));
    }
}
