//! The [`Store`] trait implementation, delegating to the per-entity
//! modules.

use crate::ElfStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elf_core::error::Result;
use elf_core::model::{
    AnomalySignal, Assumption, AssumptionStatus, CeoReview, ConfidenceUpdate, Decision,
    DecisionStatus, DomainBaseline, DomainMetadata, Experiment, ExtractedPattern,
    FraudClassification, FraudReport, Heuristic, HeuristicStatus, Invariant, Learning,
    LearningType, MetaAlert, AlertSeverity, AlertState, MetricConfig, MetricObservation,
    NewHeuristic, NewLearning, Pattern, Statistics, ValidationReport, Violation,
    ViolationSummary,
};
use elf_core::storage::{
    AuditClose, AuditOpen, ConfidenceTransition, EvictionCandidate, HeuristicQuery,
    NewConfidenceUpdate, Store,
};

#[async_trait]
impl Store for ElfStorage {
    async fn insert_heuristic(
        &self,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic> {
        self.insert_heuristic_row(new, ema_alpha, ema_warmup).await
    }

    async fn get_heuristic(&self, id: i64) -> Result<Option<Heuristic>> {
        self.get_heuristic_row(id).await
    }

    async fn list_heuristics(&self, query: &HeuristicQuery) -> Result<Vec<Heuristic>> {
        self.list_heuristic_rows(query).await
    }

    async fn list_active_heuristics_in_domain(&self, domain: &str) -> Result<Vec<Heuristic>> {
        self.list_active_in_domain(domain).await
    }

    async fn record_confidence_transition(
        &self,
        heuristic_id: i64,
        transition: &ConfidenceTransition,
        update: &NewConfidenceUpdate,
    ) -> Result<ConfidenceUpdate> {
        self.record_confidence_transition_row(heuristic_id, transition, update).await
    }

    async fn set_heuristic_status(
        &self,
        heuristic_id: i64,
        status: HeuristicStatus,
        dormant_since: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.set_heuristic_status_row(heuristic_id, status, dormant_since).await
    }

    async fn list_confidence_updates(
        &self,
        heuristic_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConfidenceUpdate>> {
        self.list_confidence_update_rows(heuristic_id, since).await
    }

    async fn list_fraud_check_candidates(
        &self,
        stale_before: DateTime<Utc>,
        min_applications: i64,
        limit: i64,
    ) -> Result<Vec<Heuristic>> {
        self.list_fraud_candidates(stale_before, min_applications, limit).await
    }

    async fn list_dormant_heuristics(&self) -> Result<Vec<Heuristic>> {
        self.list_dormant_rows().await
    }

    async fn get_pattern_by_hash(&self, pattern_hash: &str) -> Result<Option<Pattern>> {
        self.get_pattern_by_hash_row(pattern_hash).await
    }

    async fn insert_pattern(
        &self,
        extracted: &ExtractedPattern,
        pattern_hash: &str,
        strength: f64,
    ) -> Result<Pattern> {
        self.insert_pattern_row(extracted, pattern_hash, strength).await
    }

    async fn reinforce_pattern(
        &self,
        pattern_id: i64,
        occurrence_increment: i64,
        strength: f64,
        session_ids: &[String],
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        self.reinforce_pattern_row(pattern_id, occurrence_increment, strength, session_ids, last_seen)
            .await
    }

    async fn list_patterns(
        &self,
        project_path: Option<&str>,
        unpromoted_only: bool,
    ) -> Result<Vec<Pattern>> {
        self.list_pattern_rows(project_path, unpromoted_only).await
    }

    async fn set_pattern_strength(&self, pattern_id: i64, strength: f64) -> Result<()> {
        self.set_pattern_strength_row(pattern_id, strength).await
    }

    async fn promote_pattern(
        &self,
        pattern_id: i64,
        new: &NewHeuristic,
        ema_alpha: f64,
        ema_warmup: i64,
    ) -> Result<Heuristic> {
        self.promote_pattern_row(pattern_id, new, ema_alpha, ema_warmup).await
    }

    async fn insert_learning(&self, new: &NewLearning) -> Result<Learning> {
        self.insert_learning_row(new).await
    }

    async fn list_learnings_by_domain(&self, domain: &str, limit: i64) -> Result<Vec<Learning>> {
        self.list_learnings_by_domain_rows(domain, limit).await
    }

    async fn list_learnings_by_tags(
        &self,
        tags: &[String],
        limit: i64,
    ) -> Result<Vec<Learning>> {
        self.list_learnings_by_tags_rows(tags, limit).await
    }

    async fn list_recent_learnings(
        &self,
        type_filter: Option<LearningType>,
        limit: i64,
    ) -> Result<Vec<Learning>> {
        self.list_recent_learning_rows(type_filter, limit).await
    }

    async fn ensure_domain_metadata(
        &self,
        domain: &str,
        soft_limit: i64,
        hard_limit: i64,
    ) -> Result<DomainMetadata> {
        self.ensure_domain_metadata_row(domain, soft_limit, hard_limit).await
    }

    async fn get_domain_metadata(&self, domain: &str) -> Result<Option<DomainMetadata>> {
        self.get_domain_metadata_row(domain).await
    }

    async fn list_domain_metadata(&self) -> Result<Vec<DomainMetadata>> {
        self.list_domain_metadata_rows().await
    }

    async fn list_eviction_candidates(&self, domain: &str) -> Result<Vec<EvictionCandidate>> {
        self.list_eviction_candidate_rows(domain).await
    }

    async fn update_domain_health(
        &self,
        domain: &str,
        avg_confidence: Option<f64>,
        health_score: Option<f64>,
    ) -> Result<()> {
        self.update_domain_health_row(domain, avg_confidence, health_score).await
    }

    async fn get_domain_baseline(&self, domain: &str) -> Result<Option<DomainBaseline>> {
        self.get_domain_baseline_row(domain).await
    }

    async fn upsert_domain_baseline(&self, baseline: &DomainBaseline) -> Result<()> {
        self.upsert_domain_baseline_row(baseline).await
    }

    async fn domain_update_frequencies(&self, domain: &str) -> Result<Vec<f64>> {
        self.domain_update_frequency_rows(domain).await
    }

    async fn insert_fraud_report(
        &self,
        heuristic_id: i64,
        fraud_score: f64,
        classification: FraudClassification,
        likelihood_ratio: f64,
        signals: &[AnomalySignal],
    ) -> Result<FraudReport> {
        self.insert_fraud_report_row(
            heuristic_id,
            fraud_score,
            classification,
            likelihood_ratio,
            signals,
        )
        .await
    }

    async fn insert_fraud_response(
        &self,
        fraud_report_id: i64,
        response_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<()> {
        self.insert_fraud_response_row(fraud_report_id, response_type, parameters).await
    }

    async fn stamp_fraud_check(&self, heuristic_id: i64) -> Result<()> {
        self.stamp_fraud_check_row(heuristic_id).await
    }

    async fn insert_session_context(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        context_hash: &str,
        context_preview: &str,
        heuristics_applied: &[i64],
    ) -> Result<()> {
        self.insert_session_context_row(
            session_id,
            agent_id,
            context_hash,
            context_preview,
            heuristics_applied,
        )
        .await
    }

    async fn purge_session_contexts(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.purge_session_context_rows(cutoff).await
    }

    async fn insert_metric(
        &self,
        metric_name: &str,
        value: f64,
        observed_at: DateTime<Utc>,
        domain: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.insert_metric_row(metric_name, value, observed_at, domain, metadata).await
    }

    async fn metric_window(
        &self,
        metric_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<MetricObservation>> {
        self.metric_window_rows(metric_name, from, to, domain).await
    }

    async fn earliest_observation(
        &self,
        metric_name: &str,
        domain: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.earliest_observation_row(metric_name, domain).await
    }

    async fn list_metric_names(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        self.list_metric_name_rows(since).await
    }

    async fn refresh_hourly_rollups(&self, since: DateTime<Utc>) -> Result<u64> {
        self.refresh_hourly_rollup_rows(since).await
    }

    async fn find_unresolved_alert(
        &self,
        alert_type: &str,
        metric_name: Option<&str>,
    ) -> Result<Option<MetaAlert>> {
        self.find_unresolved_alert_row(alert_type, metric_name).await
    }

    async fn insert_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        metric_name: Option<&str>,
        current_value: Option<f64>,
        baseline_value: Option<f64>,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<MetaAlert> {
        self.insert_alert_row(
            alert_type,
            severity,
            metric_name,
            current_value,
            baseline_value,
            message,
            context,
        )
        .await
    }

    async fn touch_alert(&self, alert_id: i64, message: &str) -> Result<()> {
        self.touch_alert_row(alert_id, message).await
    }

    async fn set_alert_state(&self, alert_id: i64, state: AlertState) -> Result<bool> {
        self.set_alert_state_row(alert_id, state).await
    }

    async fn get_alert(&self, alert_id: i64) -> Result<Option<MetaAlert>> {
        self.get_alert_row(alert_id).await
    }

    async fn list_active_alerts(
        &self,
        severity: Option<AlertSeverity>,
    ) -> Result<Vec<MetaAlert>> {
        self.list_active_alert_rows(severity).await
    }

    async fn ensure_metric_config(&self, metric_name: &str) -> Result<MetricConfig> {
        self.ensure_metric_config_row(metric_name).await
    }

    async fn record_alert_outcome(
        &self,
        metric_name: &str,
        is_true_positive: bool,
    ) -> Result<()> {
        self.record_alert_outcome_row(metric_name, is_true_positive).await
    }

    async fn list_metric_configs(&self) -> Result<Vec<MetricConfig>> {
        self.list_metric_config_rows().await
    }

    async fn list_decisions(
        &self,
        domain: Option<&str>,
        status: DecisionStatus,
        limit: i64,
    ) -> Result<Vec<Decision>> {
        self.list_decision_rows(domain, status, limit).await
    }

    async fn list_invariants(
        &self,
        domain: Option<&str>,
        status: &str,
        limit: i64,
    ) -> Result<Vec<Invariant>> {
        self.list_invariant_rows(domain, status, limit).await
    }

    async fn list_assumptions(
        &self,
        domain: Option<&str>,
        status: AssumptionStatus,
        limit: i64,
    ) -> Result<Vec<Assumption>> {
        self.list_assumption_rows(domain, status, limit).await
    }

    async fn insert_violation(
        &self,
        rule_id: i64,
        rule_name: &str,
        description: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Violation> {
        self.insert_violation_row(rule_id, rule_name, description, session_id).await
    }

    async fn acknowledge_violation(&self, violation_id: i64) -> Result<bool> {
        self.acknowledge_violation_row(violation_id).await
    }

    async fn list_violations(
        &self,
        days: i64,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Violation>> {
        self.list_violation_rows(days, acknowledged).await
    }

    async fn violation_summary(&self, days: i64) -> Result<ViolationSummary> {
        self.violation_summary_row(days).await
    }

    async fn list_active_experiments(&self) -> Result<Vec<Experiment>> {
        self.list_active_experiment_rows().await
    }

    async fn list_pending_ceo_reviews(&self) -> Result<Vec<CeoReview>> {
        self.list_pending_ceo_review_rows().await
    }

    async fn open_query_audit(&self, open: &AuditOpen) -> Result<i64> {
        self.open_query_audit_row(open).await
    }

    async fn finalize_query_audit(&self, audit_id: i64, close: &AuditClose) -> Result<()> {
        self.finalize_query_audit_row(audit_id, close).await
    }

    async fn statistics(&self) -> Result<Statistics> {
        self.statistics_row().await
    }

    async fn validate_database(&self) -> Result<ValidationReport> {
        self.validate_database_row().await
    }
}
