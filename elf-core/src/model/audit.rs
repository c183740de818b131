use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal status of an audited query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    Error,
    Timeout,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
            QueryStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(QueryStatus::Success),
            "error" => Some(QueryStatus::Error),
            "timeout" => Some(QueryStatus::Timeout),
            _ => None,
        }
    }
}

/// One row of the query audit log. Every Query API call appears exactly
/// once, finalized with a non-null `completed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAudit {
    pub id: i64,
    pub query_type: String,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub domain: Option<String>,
    pub tags: Option<String>,
    pub limit_requested: Option<i64>,
    pub max_tokens_requested: Option<i64>,
    pub results_returned: Option<i64>,
    pub tokens_approximated: Option<i64>,
    pub duration_ms: Option<i64>,
    pub status: QueryStatus,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub golden_rules_returned: i64,
    pub heuristics_count: i64,
    pub learnings_count: i64,
    pub experiments_count: i64,
    pub ceo_reviews_count: i64,
    pub query_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Knowledge-base counters returned by `get_statistics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_learnings: i64,
    pub total_heuristics: i64,
    pub total_patterns: i64,
    pub total_experiments: i64,
    pub total_ceo_reviews: i64,
    pub golden_heuristics: i64,
    pub learnings_by_type: BTreeMap<String, i64>,
    pub learnings_by_domain: BTreeMap<String, i64>,
    pub heuristics_by_domain: BTreeMap<String, i64>,
    pub experiments_by_status: BTreeMap<String, i64>,
    pub ceo_reviews_by_status: BTreeMap<String, i64>,
    pub violations_7d: i64,
}

/// Result of `validate_database`: integrity, schema presence, and
/// writer-ownership checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: BTreeMap<String, serde_json::Value>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { valid: true, errors: Vec::new(), warnings: Vec::new(), checks: BTreeMap::new() }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn check(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.checks.insert(name.into(), value);
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
