//! Advisory quality checks for recorded heuristics.
//!
//! Warnings never block a write; they are returned to the caller so hooks
//! and CLIs can prompt for a better rule.

use serde::{Deserialize, Serialize};

const ACTION_VERBS: &[&str] = &[
    "always", "never", "use", "avoid", "check", "ensure", "prefer", "validate", "test", "verify",
    "before", "after", "when", "if", "do", "dont", "don't", "should", "must",
];

const TESTABLE_INDICATORS: &[&str] = &[
    "if", "when", "before", "after", "until", "unless", "error", "fail", "success", "works",
    "breaks",
];

/// Result of the quality checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub passed: bool,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    /// 0..=5, five minus the number of warnings
    pub score: u8,
}

/// Run the quality checklist on a rule and its explanation.
pub fn assess(rule: &str, explanation: &str) -> QualityReport {
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();
    let rule_lower = rule.to_lowercase();
    let word_count = rule.split_whitespace().count();

    if !ACTION_VERBS.iter().any(|verb| rule_lower.contains(verb)) {
        warnings.push("Rule may not be actionable (no action verbs found)".to_string());
        suggestions
            .push("Consider rephrasing as 'Always X', 'Never Y', or 'When Z, do W'".to_string());
    }

    if word_count < 4 {
        warnings.push("Rule is very short - may be too vague".to_string());
        suggestions.push("Add context: when does this apply? what's the scope?".to_string());
    }

    if word_count > 20 {
        warnings.push("Rule is long - may be hard to remember".to_string());
        suggestions.push("Consider splitting into multiple rules or shortening".to_string());
    }

    if explanation.trim().len() < 10 {
        warnings.push("No explanation provided".to_string());
        suggestions.push("Add WHY this heuristic works - future agents need context".to_string());
    }

    if !TESTABLE_INDICATORS.iter().any(|ind| rule_lower.contains(ind)) {
        warnings.push("May be hard to validate (no clear conditions)".to_string());
        suggestions
            .push("Consider adding: 'When X happens...' or 'To prevent Y...'".to_string());
    }

    QualityReport {
        passed: warnings.is_empty(),
        score: 5u8.saturating_sub(warnings.len() as u8),
        warnings,
        suggestions,
    }
}
