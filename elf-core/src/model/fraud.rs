use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to a single anomaly signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SignalSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSeverity::Low => "low",
            SignalSeverity::Medium => "medium",
            SignalSeverity::High => "high",
            SignalSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(SignalSeverity::Low),
            "medium" => Some(SignalSeverity::Medium),
            "high" => Some(SignalSeverity::High),
            "critical" => Some(SignalSeverity::Critical),
            _ => None,
        }
    }
}

/// One detector's finding for a heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySignal {
    /// Stable detector name (`success_rate_anomaly`, `temporal_manipulation`,
    /// `unnatural_confidence_growth`)
    pub detector_name: String,
    /// Normalized score in `[0, 1]`
    pub score: f64,
    pub severity: SignalSeverity,
    pub reason: String,
    /// Opaque evidence blob persisted alongside the signal
    pub evidence: serde_json::Value,
}

/// Posterior classification bands for the fused fraud score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudClassification {
    Clean,
    LowConfidence,
    Suspicious,
    FraudLikely,
    FraudConfirmed,
}

impl FraudClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            FraudClassification::Clean => "clean",
            FraudClassification::LowConfidence => "low_confidence",
            FraudClassification::Suspicious => "suspicious",
            FraudClassification::FraudLikely => "fraud_likely",
            FraudClassification::FraudConfirmed => "fraud_confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(FraudClassification::Clean),
            "low_confidence" => Some(FraudClassification::LowConfidence),
            "suspicious" => Some(FraudClassification::Suspicious),
            "fraud_likely" => Some(FraudClassification::FraudLikely),
            "fraud_confirmed" => Some(FraudClassification::FraudConfirmed),
            _ => None,
        }
    }

    /// Whether this classification triggers an alert response row.
    pub fn warrants_alert(self) -> bool {
        matches!(self, FraudClassification::FraudLikely | FraudClassification::FraudConfirmed)
    }
}

/// Complete fraud detection report for one heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudReport {
    pub id: i64,
    pub heuristic_id: i64,
    /// Bayesian posterior probability in `[0, 1]`
    pub fraud_score: f64,
    pub classification: FraudClassification,
    pub likelihood_ratio: f64,
    pub signals: Vec<AnomalySignal>,
    pub created_at: DateTime<Utc>,
}

/// Per-domain statistical baseline the success-rate detector compares
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainBaseline {
    pub domain: String,
    pub avg_success_rate: f64,
    pub std_success_rate: f64,
    pub avg_update_frequency: f64,
    pub std_update_frequency: f64,
    pub sample_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// Privacy-preserving session context record: hash plus a short preview,
/// purged after the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContextRecord {
    pub id: i64,
    pub session_id: String,
    pub agent_id: Option<String>,
    pub context_hash: String,
    pub context_preview: String,
    /// JSON list of applied heuristic ids
    pub heuristics_applied: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_round_trips() {
        for c in [
            FraudClassification::Clean,
            FraudClassification::LowConfidence,
            FraudClassification::Suspicious,
            FraudClassification::FraudLikely,
            FraudClassification::FraudConfirmed,
        ] {
            assert_eq!(FraudClassification::parse(c.as_str()), Some(c));
        }
    }

    #[test]
    fn only_likely_and_confirmed_alert() {
        assert!(!FraudClassification::Clean.warrants_alert());
        assert!(!FraudClassification::Suspicious.warrants_alert());
        assert!(FraudClassification::FraudLikely.warrants_alert());
        assert!(FraudClassification::FraudConfirmed.warrants_alert());
    }
}
