//! ADRs, invariants, violations, and the auxiliary entities the core
//! persists on behalf of external collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an architecture decision record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Accepted,
    Proposed,
    Superseded,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionStatus::Accepted => "accepted",
            DecisionStatus::Proposed => "proposed",
            DecisionStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(DecisionStatus::Accepted),
            "proposed" => Some(DecisionStatus::Proposed),
            "superseded" => Some(DecisionStatus::Superseded),
            _ => None,
        }
    }
}

/// Architecture decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub title: String,
    pub context: String,
    pub options_considered: Option<String>,
    pub decision: String,
    pub rationale: String,
    pub domain: Option<String>,
    pub status: DecisionStatus,
    /// Self-reference to the decision that replaced this one
    pub superseded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantScope {
    Codebase,
    Module,
    Function,
    Runtime,
}

impl InvariantScope {
    pub fn as_str(self) -> &'static str {
        match self {
            InvariantScope::Codebase => "codebase",
            InvariantScope::Module => "module",
            InvariantScope::Function => "function",
            InvariantScope::Runtime => "runtime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "codebase" => Some(InvariantScope::Codebase),
            "module" => Some(InvariantScope::Module),
            "function" => Some(InvariantScope::Function),
            "runtime" => Some(InvariantScope::Runtime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantSeverity {
    Error,
    Warning,
    Info,
}

impl InvariantSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            InvariantSeverity::Error => "error",
            InvariantSeverity::Warning => "warning",
            InvariantSeverity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(InvariantSeverity::Error),
            "warning" => Some(InvariantSeverity::Warning),
            "info" => Some(InvariantSeverity::Info),
            _ => None,
        }
    }
}

/// A statement about what must always be true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invariant {
    pub id: i64,
    pub statement: String,
    pub rationale: String,
    pub domain: Option<String>,
    pub scope: InvariantScope,
    pub validation_type: Option<String>,
    pub severity: InvariantSeverity,
    /// `active` or `retired`
    pub status: String,
    pub violation_count: i64,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub last_violated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Golden-rule violation record (accountability tracking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: i64,
    pub rule_id: i64,
    pub rule_name: String,
    pub violation_date: DateTime<Utc>,
    pub description: Option<String>,
    pub session_id: Option<String>,
    pub acknowledged: bool,
}

/// Aggregated violation counts over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub window_days: i64,
    pub total: i64,
    pub acknowledged: i64,
    pub unacknowledged: i64,
    /// Violation counts per rule name, most violated first
    pub by_rule: Vec<(String, i64)>,
}

/// Active experiment, driven by external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub name: String,
    pub hypothesis: Option<String>,
    pub status: String,
    pub cycles_run: i64,
    pub folder_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CEO escalation request, driven by external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeoReview {
    pub id: i64,
    pub title: String,
    pub context: Option<String>,
    pub recommendation: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionStatus {
    Active,
    Verified,
    Challenged,
    Invalidated,
}

impl AssumptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssumptionStatus::Active => "active",
            AssumptionStatus::Verified => "verified",
            AssumptionStatus::Challenged => "challenged",
            AssumptionStatus::Invalidated => "invalidated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AssumptionStatus::Active),
            "verified" => Some(AssumptionStatus::Verified),
            "challenged" => Some(AssumptionStatus::Challenged),
            "invalidated" => Some(AssumptionStatus::Invalidated),
            _ => None,
        }
    }
}

/// Hypothesis to verify or challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    pub id: i64,
    pub assumption: String,
    pub context: Option<String>,
    pub source: Option<String>,
    pub confidence: f64,
    pub status: AssumptionStatus,
    pub domain: Option<String>,
    pub verified_count: i64,
    pub challenged_count: i64,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
