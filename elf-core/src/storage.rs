//! # Storage Abstraction
//!
//! Unified trait for the embedded relational store.
//!
//! The engines (lifecycle, distiller, fraud, meta-observer, context builder)
//! talk to storage only through this trait; `elf-storage` provides the
//! libSQL implementation. Writer-ownership rules from the concurrency model
//! are expressed here by which component is documented to call each method.

use crate::error::Result;
use crate::model::{
    AnomalySignal, Assumption, AssumptionStatus, CeoReview, ConfidenceUpdate, Decision,
    DecisionStatus, DomainBaseline, DomainMetadata, Experiment, ExtractedPattern,
    FraudClassification, FraudReport, Heuristic, HeuristicStatus, Invariant, Learning,
    LearningType, MetaAlert, AlertSeverity, AlertState, MetricConfig, MetricObservation,
    NewHeuristic, NewLearning, Pattern, QueryStatus, Statistics, UpdateType, ValidationReport,
    Violation, ViolationSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// The heuristic columns owned by the lifecycle engine, written atomically
/// together with their audit row.
#[derive(Debug, Clone)]
pub struct ConfidenceTransition {
    pub confidence: f64,
    pub confidence_ema: Option<f64>,
    pub ema_warmup_remaining: i64,
    pub times_validated: i64,
    pub times_violated: i64,
    pub times_contradicted: i64,
    pub times_revived: i64,
    pub status: HeuristicStatus,
    pub dormant_since: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_confidence_update: Option<DateTime<Utc>>,
    pub update_count_today: i64,
    pub update_count_reset_date: Option<NaiveDate>,
}

/// Parameters for one append-only `confidence_updates` row.
#[derive(Debug, Clone)]
pub struct NewConfidenceUpdate {
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
}

/// Filters for heuristic listing.
#[derive(Debug, Clone, Default)]
pub struct HeuristicQuery {
    pub domain: Option<String>,
    /// Caller location for project-path scoping; `None` hides pinned rows
    pub current_location: Option<String>,
    /// Include dormant rows (context building excludes them)
    pub include_dormant: bool,
    pub limit: Option<i64>,
}

/// One row of the eviction-candidates view, lowest score first.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub heuristic_id: i64,
    pub domain: String,
    pub status: HeuristicStatus,
    pub eviction_score: f64,
}

/// Fields for opening a query-audit row.
#[derive(Debug, Clone, Default)]
pub struct AuditOpen {
    pub query_type: String,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub domain: Option<String>,
    pub tags: Option<String>,
    pub limit_requested: Option<i64>,
    pub max_tokens_requested: Option<i64>,
    pub query_summary: Option<String>,
}

/// Fields for finalizing a query-audit row.
#[derive(Debug, Clone, Default)]
pub struct AuditClose {
    pub status: Option<QueryStatus>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub duration_ms: i64,
    pub results_returned: Option<i64>,
    pub tokens_approximated: Option<i64>,
    pub golden_rules_returned: i64,
    pub heuristics_count: i64,
    pub learnings_count: i64,
    pub experiments_count: i64,
    pub ceo_reviews_count: i64,
}

impl AuditClose {
    /// Shorthand for a successful call returning `results` rows.
    pub fn success(results: i64) -> Self {
        Self {
            status: Some(QueryStatus::Success),
            results_returned: Some(results),
            ..Self::default()
        }
    }
}

/// Unified storage backend trait.
///
/// All operations are async; implementations must be safe to call from
/// concurrent tasks, with writes serialized by the underlying store.
#[async_trait]
pub trait Store: Send + Sync {
    // ========== Heuristics ==========

    /// Insert a heuristic. Only the lifecycle engine calls this; admission
    /// control has already run. Seeds the EMA state from the initial
    /// confidence.
    async fn insert_heuristic(
        &self,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic>;

    async fn get_heuristic(&self, id: i64) -> Result<Option<Heuristic>>;

    /// List heuristics with location scoping applied, ordered by
    /// `(confidence desc, times_validated desc)`.
    async fn list_heuristics(&self, query: &HeuristicQuery) -> Result<Vec<Heuristic>>;

    /// All `active` heuristics in a domain (novelty checks, baselines).
    async fn list_active_heuristics_in_domain(&self, domain: &str) -> Result<Vec<Heuristic>>;

    /// Atomically apply a lifecycle transition and append its audit row.
    /// Lifecycle engine only.
    async fn record_confidence_transition(
        &self,
        heuristic_id: i64,
        transition: &ConfidenceTransition,
        update: &NewConfidenceUpdate,
    ) -> Result<ConfidenceUpdate>;

    /// Change a heuristic's lifecycle status. Lifecycle engine only.
    async fn set_heuristic_status(
        &self,
        heuristic_id: i64,
        status: HeuristicStatus,
        dormant_since: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Confidence-update history for one heuristic since `since`, ordered
    /// by `created_at` ascending.
    async fn list_confidence_updates(
        &self,
        heuristic_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConfidenceUpdate>>;

    /// Heuristics due for a fraud check: `last_fraud_check` older than
    /// `stale_before` (or never checked) and total applications at least
    /// `min_applications`. Bounded by `limit`.
    async fn list_fraud_check_candidates(
        &self,
        stale_before: DateTime<Utc>,
        min_applications: i64,
        limit: i64,
    ) -> Result<Vec<Heuristic>>;

    /// Dormant heuristics with declared revival conditions.
    async fn list_dormant_heuristics(&self) -> Result<Vec<Heuristic>>;

    // ========== Patterns (observer + distiller) ==========

    async fn get_pattern_by_hash(&self, pattern_hash: &str) -> Result<Option<Pattern>>;

    /// Insert a fresh pattern row. Observer only.
    async fn insert_pattern(
        &self,
        extracted: &ExtractedPattern,
        pattern_hash: &str,
        strength: f64,
    ) -> Result<Pattern>;

    /// Reinforce an existing pattern: bump occurrences, strength, and the
    /// capped session list. Observer only.
    async fn reinforce_pattern(
        &self,
        pattern_id: i64,
        occurrence_increment: i64,
        strength: f64,
        session_ids: &[String],
        last_seen: DateTime<Utc>,
    ) -> Result<()>;

    /// Patterns, optionally filtered to a project and to unpromoted rows.
    async fn list_patterns(
        &self,
        project_path: Option<&str>,
        unpromoted_only: bool,
    ) -> Result<Vec<Pattern>>;

    /// Write a decayed strength back. Distiller only.
    async fn set_pattern_strength(&self, pattern_id: i64, strength: f64) -> Result<()>;

    /// Promote a pattern: create the heuristic and stamp
    /// `promoted_to_heuristic_id` in one transaction. Distiller only.
    async fn promote_pattern(
        &self,
        pattern_id: i64,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic>;

    // ========== Learnings ==========

    async fn insert_learning(&self, new: &NewLearning) -> Result<Learning>;

    async fn list_learnings_by_domain(&self, domain: &str, limit: i64) -> Result<Vec<Learning>>;

    /// Substring match on the stored comma-separated tags column.
    async fn list_learnings_by_tags(&self, tags: &[String], limit: i64) -> Result<Vec<Learning>>;

    async fn list_recent_learnings(
        &self,
        type_filter: Option<LearningType>,
        limit: i64,
    ) -> Result<Vec<Learning>>;

    // ========== Domain capacity ==========

    /// Fetch a domain's capacity row, creating it with the given defaults
    /// when missing.
    async fn ensure_domain_metadata(
        &self,
        domain: &str,
        soft_limit: i64,
        hard_limit: i64,
    ) -> Result<DomainMetadata>;

    async fn get_domain_metadata(&self, domain: &str) -> Result<Option<DomainMetadata>>;

    async fn list_domain_metadata(&self) -> Result<Vec<DomainMetadata>>;

    /// Rows of the eviction-candidates view for one domain, lowest score
    /// first.
    async fn list_eviction_candidates(&self, domain: &str) -> Result<Vec<EvictionCandidate>>;

    /// Refresh derived health columns on the domain row.
    async fn update_domain_health(
        &self,
        domain: &str,
        avg_confidence: Option<f64>,
        health_score: Option<f64>,
    ) -> Result<()>;

    // ========== Domain baselines (fraud detector) ==========

    async fn get_domain_baseline(&self, domain: &str) -> Result<Option<DomainBaseline>>;

    /// Replace the current baseline and append a history snapshot recording
    /// drift from the previous values. Fraud detector only.
    async fn upsert_domain_baseline(&self, baseline: &DomainBaseline) -> Result<()>;

    /// Updates-per-day frequencies for each active heuristic in a domain.
    async fn domain_update_frequencies(&self, domain: &str) -> Result<Vec<f64>>;

    // ========== Fraud reports ==========

    /// Persist a report with its signals, increment `fraud_flags`, and
    /// stamp `last_fraud_check` in one transaction. Fraud detector only.
    async fn insert_fraud_report(
        &self,
        heuristic_id: i64,
        fraud_score: f64,
        classification: FraudClassification,
        likelihood_ratio: f64,
        signals: &[AnomalySignal],
    ) -> Result<FraudReport>;

    /// Record an alert-type response row for a report. Fraud detector only.
    async fn insert_fraud_response(
        &self,
        fraud_report_id: i64,
        response_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<()>;

    /// Stamp `last_fraud_check` without raising a flag (clean result).
    async fn stamp_fraud_check(&self, heuristic_id: i64) -> Result<()>;

    /// Store a privacy-reduced session context row.
    async fn insert_session_context(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        context_hash: &str,
        context_preview: &str,
        heuristics_applied: &[i64],
    ) -> Result<()>;

    /// Delete session-context rows older than `cutoff`; returns rows purged.
    async fn purge_session_contexts(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // ========== Metrics & meta-observer ==========

    /// Append a metric observation. A duplicate
    /// `(metric_name, observed_at, domain)` violates the unique index and
    /// surfaces as a database error.
    async fn insert_metric(
        &self,
        metric_name: &str,
        value: f64,
        observed_at: DateTime<Utc>,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64>;

    /// Observations in `[from, to]` ordered by `observed_at` ascending.
    async fn metric_window(
        &self,
        metric_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<MetricObservation>>;

    async fn earliest_observation(
        &self,
        metric_name: &str,
        domain: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Names of all series with observations since `since`.
    async fn list_metric_names(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Recompute hourly rollups for observations since `since`.
    async fn refresh_hourly_rollups(&self, since: DateTime<Utc>) -> Result<u64>;

    /// Unresolved alert matching the dedup key, if any. Meta-observer only.
    async fn find_unresolved_alert(
        &self,
        alert_type: &str,
        metric_name: Option<&str>,
    ) -> Result<Option<MetaAlert>>;

    /// Insert a new alert in state `new`. Meta-observer only.
    #[allow(clippy::too_many_arguments)]
    async fn insert_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        metric_name: Option<&str>,
        current_value: Option<f64>,
        baseline_value: Option<f64>,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<MetaAlert>;

    /// Refresh `last_seen`/`message` on a deduplicated alert.
    async fn touch_alert(&self, alert_id: i64, message: &str) -> Result<()>;

    /// Transition an alert's state; returns false when the transition is
    /// not allowed from the current state.
    async fn set_alert_state(&self, alert_id: i64, state: AlertState) -> Result<bool>;

    async fn get_alert(&self, alert_id: i64) -> Result<Option<MetaAlert>>;

    /// Non-terminal alerts, optionally filtered by severity.
    async fn list_active_alerts(&self, severity: Option<AlertSeverity>) -> Result<Vec<MetaAlert>>;

    /// Fetch per-metric config, creating defaults when missing.
    async fn ensure_metric_config(&self, metric_name: &str) -> Result<MetricConfig>;

    /// Record a human TP/FP label for an alert's metric.
    async fn record_alert_outcome(&self, metric_name: &str, is_true_positive: bool) -> Result<()>;

    async fn list_metric_configs(&self) -> Result<Vec<MetricConfig>>;

    // ========== Decisions, invariants, violations, auxiliaries ==========

    async fn list_decisions(
        &self,
        domain: Option<&str>,
        status: DecisionStatus,
        limit: i64,
    ) -> Result<Vec<Decision>>;

    async fn list_invariants(
        &self,
        domain: Option<&str>,
        status: &str,
        limit: i64,
    ) -> Result<Vec<Invariant>>;

    async fn list_assumptions(
        &self,
        domain: Option<&str>,
        status: AssumptionStatus,
        limit: i64,
    ) -> Result<Vec<Assumption>>;

    async fn insert_violation(
        &self,
        rule_id: i64,
        rule_name: &str,
        description: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Violation>;

    async fn acknowledge_violation(&self, violation_id: i64) -> Result<bool>;

    async fn list_violations(
        &self,
        days: i64,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Violation>>;

    async fn violation_summary(&self, days: i64) -> Result<ViolationSummary>;

    async fn list_active_experiments(&self) -> Result<Vec<Experiment>>;

    async fn list_pending_ceo_reviews(&self) -> Result<Vec<CeoReview>>;

    // ========== Audit, statistics, validation ==========

    /// Open a query-audit row; returns its id.
    async fn open_query_audit(&self, open: &AuditOpen) -> Result<i64>;

    /// Finalize a query-audit row with status, duration, and bucket counts.
    async fn finalize_query_audit(&self, audit_id: i64, close: &AuditClose) -> Result<()>;

    async fn statistics(&self) -> Result<Statistics>;

    /// Integrity, schema, and writer-ownership checks.
    async fn validate_database(&self) -> Result<ValidationReport>;
}
