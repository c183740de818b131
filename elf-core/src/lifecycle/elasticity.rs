//! Two-tier elastic domain capacity.
//!
//! Admission of a new heuristic depends on the domain's capacity state:
//! unconditional while normal, threshold-gated in overflow, and rejected in
//! critical unless a CEO override raises the effective cap.

use crate::model::{DomainMetadata, DomainState, Heuristic, NewHeuristic};
use std::collections::HashSet;

/// Tokenize a rule for similarity comparison: lowercase alphanumeric words.
fn rule_words(rule: &str) -> HashSet<String> {
    rule.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over rule words.
pub fn rule_similarity(a: &str, b: &str) -> f64 {
    let words_a = rule_words(a);
    let words_b = rule_words(b);
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count() as f64;
    let union = words_a.union(&words_b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Novelty of a candidate rule against a domain's existing rules:
/// `1 - max Jaccard similarity`. An empty domain is maximally novel.
pub fn novelty(rule: &str, existing: &[Heuristic]) -> f64 {
    let max_similarity = existing
        .iter()
        .map(|h| rule_similarity(rule, &h.rule))
        .fold(0.0_f64, f64::max);
    1.0 - max_similarity
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admit,
    /// Rejected in overflow: which expansion threshold failed
    RejectedOverflow { reason: String },
    /// Rejected in critical with no effective headroom
    RejectedCritical,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Decide whether a candidate may enter a domain given its capacity row and
/// the current active population.
pub fn admit(
    candidate: &NewHeuristic,
    candidate_novelty: f64,
    candidate_validations: i64,
    meta: &DomainMetadata,
) -> Admission {
    let count = meta.current_count;
    let state = DomainState::from_count(count, meta.soft_limit, meta.hard_limit);

    match state {
        DomainState::Normal => Admission::Admit,
        DomainState::Overflow => {
            check_expansion(candidate, candidate_novelty, candidate_validations, meta)
        }
        DomainState::Critical => {
            if count < meta.effective_hard_limit() {
                // CEO override opened headroom; expansion thresholds still apply
                check_expansion(candidate, candidate_novelty, candidate_validations, meta)
            } else {
                Admission::RejectedCritical
            }
        }
    }
}

fn check_expansion(
    candidate: &NewHeuristic,
    candidate_novelty: f64,
    candidate_validations: i64,
    meta: &DomainMetadata,
) -> Admission {
    if candidate.confidence < meta.expansion_min_confidence {
        return Admission::RejectedOverflow {
            reason: format!(
                "confidence {:.2} below expansion threshold {:.2}",
                candidate.confidence, meta.expansion_min_confidence
            ),
        };
    }
    if candidate_validations < meta.expansion_min_validations {
        return Admission::RejectedOverflow {
            reason: format!(
                "{candidate_validations} validations below expansion threshold {}",
                meta.expansion_min_validations
            ),
        };
    }
    if candidate_novelty < meta.expansion_min_novelty {
        return Admission::RejectedOverflow {
            reason: format!(
                "novelty {:.2} below expansion threshold {:.2}",
                candidate_novelty, meta.expansion_min_novelty
            ),
        };
    }
    Admission::Admit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;
    use chrono::Utc;

    fn meta(count: i64) -> DomainMetadata {
        DomainMetadata {
            domain: "auth".into(),
            soft_limit: 5,
            hard_limit: 10,
            ceo_override_limit: None,
            current_count: count,
            state: DomainState::from_count(count, 5, 10),
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
        }
    }

    fn candidate(confidence: f64) -> NewHeuristic {
        NewHeuristic {
            domain: "auth".into(),
            rule: "Rotate session tokens on privilege change".into(),
            explanation: None,
            source_type: SourceType::Observation,
            source_id: None,
            confidence,
            times_validated: 0,
            is_golden: false,
            project_path: None,
        }
    }

    #[test]
    fn jaccard_similarity_over_words() {
        assert!((rule_similarity("always validate inputs", "always validate inputs") - 1.0).abs() < 1e-12);
        assert_eq!(rule_similarity("alpha beta", "gamma delta"), 0.0);
        // 2 shared / 4 union
        assert!((rule_similarity("alpha beta gamma", "alpha beta delta") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_domain_is_maximally_novel() {
        assert!((novelty("anything at all", &[]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normal_state_admits_unconditionally() {
        let verdict = admit(&candidate(0.1), 0.0, 0, &meta(3));
        assert!(verdict.is_admitted());
    }

    #[test]
    fn overflow_requires_all_three_thresholds() {
        let m = meta(7);

        assert!(admit(&candidate(0.85), 0.9, 5, &m).is_admitted());

        // low confidence
        assert!(matches!(
            admit(&candidate(0.5), 0.9, 5, &m),
            Admission::RejectedOverflow { .. }
        ));
        // too few validations
        assert!(matches!(
            admit(&candidate(0.85), 0.9, 2, &m),
            Admission::RejectedOverflow { .. }
        ));
        // not novel enough
        assert!(matches!(
            admit(&candidate(0.85), 0.3, 5, &m),
            Admission::RejectedOverflow { .. }
        ));
    }

    #[test]
    fn critical_rejects_without_override() {
        let verdict = admit(&candidate(0.95), 1.0, 10, &meta(11));
        assert_eq!(verdict, Admission::RejectedCritical);
    }

    #[test]
    fn ceo_override_reopens_gated_admission() {
        let mut m = meta(11);
        m.ceo_override_limit = Some(15);
        assert!(admit(&candidate(0.95), 1.0, 10, &m).is_admitted());
        assert!(matches!(
            admit(&candidate(0.5), 1.0, 10, &m),
            Admission::RejectedOverflow { .. }
        ));
    }
}
