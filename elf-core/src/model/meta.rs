use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded metric observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricObservation {
    pub id: i64,
    pub metric_name: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    pub domain: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(AlertSeverity::Info),
            "warning" => Some(AlertSeverity::Warning),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

/// Alert lifecycle: `new -> active -> ack -> resolved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    New,
    Active,
    Ack,
    Resolved,
}

impl AlertState {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertState::New => "new",
            AlertState::Active => "active",
            AlertState::Ack => "ack",
            AlertState::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(AlertState::New),
            "active" => Some(AlertState::Active),
            "ack" => Some(AlertState::Ack),
            "resolved" => Some(AlertState::Resolved),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AlertState::Resolved)
    }
}

/// Meta-observer alert with deduplication on `(alert_type, metric_name)`
/// among unresolved rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAlert {
    pub id: i64,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub state: AlertState,
    pub metric_name: Option<String>,
    pub current_value: Option<f64>,
    pub baseline_value: Option<f64>,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Per-metric detector configuration and outcome counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub metric_name: String,
    pub z_score_threshold: f64,
    pub trend_window_hours: i64,
    pub trend_sensitivity: f64,
    pub baseline_window_hours: i64,
    pub false_positive_count: i64,
    pub true_positive_count: i64,
}

impl MetricConfig {
    /// False-positive rate over all labeled outcomes, if any exist.
    pub fn false_positive_rate(&self) -> Option<f64> {
        let total = self.false_positive_count + self.true_positive_count;
        if total == 0 {
            None
        } else {
            Some(self.false_positive_count as f64 / total as f64)
        }
    }
}

/// Direction of a detected trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// How trustworthy a trend fit is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendConfidence {
    Low,
    Medium,
    High,
}

/// Least-squares trend over a rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Change in metric value per hour
    pub slope: f64,
    pub confidence: TrendConfidence,
    pub sample_count: usize,
    pub reason: Option<String>,
}

/// Z-score anomaly verdict comparing a current window to its baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub is_anomaly: bool,
    pub z_score: Option<f64>,
    pub severity: Option<AlertSeverity>,
    pub baseline_mean: Option<f64>,
    pub baseline_std: Option<f64>,
    pub current_mean: Option<f64>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpr_is_fp_over_all_labeled() {
        let mut config = MetricConfig {
            metric_name: "avg_confidence".into(),
            z_score_threshold: 3.0,
            trend_window_hours: 168,
            trend_sensitivity: 0.05,
            baseline_window_hours: 720,
            false_positive_count: 0,
            true_positive_count: 0,
        };
        assert_eq!(config.false_positive_rate(), None);

        config.false_positive_count = 1;
        config.true_positive_count = 9;
        assert!((config.false_positive_rate().unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn resolved_is_the_only_terminal_state() {
        assert!(!AlertState::New.is_terminal());
        assert!(!AlertState::Active.is_terminal());
        assert!(!AlertState::Ack.is_terminal());
        assert!(AlertState::Resolved.is_terminal());
    }
}
