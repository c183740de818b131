//! # Query API
//!
//! The typed operation set consumed by every external driver. Each
//! operation validates its inputs, runs under a caller-provided cooperative
//! timeout, writes a query-audit row on entry and exit, and is safe to call
//! concurrently.

use crate::config::ElfConfig;
use crate::context::{ContextBuilder, ContextRequest};
use crate::distill::{DistillationSummary, Distiller};
use crate::error::{Error, Result};
use crate::fraud::FraudDetector;
use crate::lifecycle::{LifecycleEngine, RecordedHeuristic, UpdateRequest};
use crate::meta::{CheckOutcome, MetaObserver};
use crate::model::{
    Assumption, AssumptionStatus, CeoReview, ConfidenceUpdate, Decision, DecisionStatus,
    Experiment, FraudReport, Heuristic, Invariant, Learning, LearningType, MetaAlert,
    NewHeuristic, NewLearning, QueryStatus, SourceType, Statistics, UpdateType,
    ValidationReport, Violation, ViolationSummary,
};
use crate::observe::{ObservationSummary, Observer};
use crate::semantic::{EmbeddingBackend, ScoredHeuristic, SemanticSearcher};
use crate::storage::{AuditClose, AuditOpen, HeuristicQuery, Store};
use crate::{markdown, validate};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard ceiling on per-call timeouts
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-call options common to every operation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Cooperative timeout; `None` means the 30 s default, capped at 600 s
    pub timeout: Option<Duration>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl CallOptions {
    fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT).min(MAX_TIMEOUT)
    }
}

/// Result of `query_by_domain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainQueryResult {
    pub domain: String,
    pub heuristics: Vec<Heuristic>,
    pub learnings: Vec<Learning>,
    pub heuristic_count: usize,
    pub learning_count: usize,
}

/// Input for `record_heuristic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeuristicParams {
    pub domain: String,
    pub rule: String,
    #[serde(default)]
    pub explanation: String,
    pub source_type: SourceType,
    pub confidence: f64,
    #[serde(default)]
    pub is_golden: bool,
    #[serde(default)]
    pub project_path: Option<String>,
}

/// Source for `observe_session`.
#[derive(Debug, Clone)]
pub enum LogSource {
    Path(PathBuf),
    Text(String),
}

/// The knowledge core service: one per process, carrying the configuration,
/// the store handle, the engines, and the caller's current location.
pub struct ElfService {
    config: ElfConfig,
    store: Arc<dyn Store>,
    lifecycle: LifecycleEngine<Arc<dyn Store>>,
    distiller: Distiller<Arc<dyn Store>>,
    fraud: FraudDetector<Arc<dyn Store>>,
    meta: MetaObserver<Arc<dyn Store>>,
    context: ContextBuilder<Arc<dyn Store>>,
    semantic: SemanticSearcher<Arc<dyn Store>>,
    observer: Observer<Arc<dyn Store>>,
    current_location: Option<String>,
}

impl ElfService {
    /// Build a service over an opened store, using the bag-of-words
    /// fallback for semantic queries.
    pub fn new(config: ElfConfig, store: Arc<dyn Store>) -> Self {
        let semantic =
            SemanticSearcher::with_fallback(store.clone(), Some(config.embedding_cache_dir()));
        Self::assemble(config, store, semantic)
    }

    /// Build a service with a real embedding backend.
    pub fn with_embedding_backend(
        config: ElfConfig,
        store: Arc<dyn Store>,
        backend: Box<dyn EmbeddingBackend>,
    ) -> Self {
        let semantic =
            SemanticSearcher::new(store.clone(), backend, Some(config.embedding_cache_dir()));
        Self::assemble(config, store, semantic)
    }

    fn assemble(
        config: ElfConfig,
        store: Arc<dyn Store>,
        semantic: SemanticSearcher<Arc<dyn Store>>,
    ) -> Self {
        let lifecycle = LifecycleEngine::new(store.clone(), config.lifecycle.clone());
        let distiller = Distiller::new(
            store.clone(),
            config.distill.clone(),
            config.lifecycle.clone(),
            config.golden_rules_path(),
        );
        let fraud = FraudDetector::new(store.clone(), config.fraud.clone());
        let meta = MetaObserver::new(store.clone(), config.meta.clone());
        let context =
            ContextBuilder::new(store.clone(), config.context.clone(), config.golden_rules_path());
        let observer = Observer::new(store.clone());
        Self {
            config,
            store,
            lifecycle,
            distiller,
            fraud,
            meta,
            context,
            semantic,
            observer,
            current_location: None,
        }
    }

    /// Set the caller's current location for project-path scoping.
    pub fn set_current_location(&mut self, location: Option<String>) {
        self.current_location = location;
    }

    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }

    pub fn config(&self) -> &ElfConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Direct access to the engines for the scheduler.
    pub fn fraud_detector(&self) -> &FraudDetector<Arc<dyn Store>> {
        &self.fraud
    }

    pub fn meta_observer(&self) -> &MetaObserver<Arc<dyn Store>> {
        &self.meta
    }

    pub fn distiller(&self) -> &Distiller<Arc<dyn Store>> {
        &self.distiller
    }

    pub fn lifecycle(&self) -> &LifecycleEngine<Arc<dyn Store>> {
        &self.lifecycle
    }

    /// Run one operation under the audit + timeout envelope. The audit row
    /// is opened before the body runs and finalized on every exit path.
    async fn run_audited<T, Fut>(
        &self,
        mut open: AuditOpen,
        options: &CallOptions,
        body: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<(T, AuditClose)>>,
    {
        open.session_id = options.session_id.clone();
        open.agent_id = options.agent_id.clone();
        let audit_id = self.store.open_query_audit(&open).await?;
        let started = std::time::Instant::now();
        let timeout = options.effective_timeout();

        let outcome = tokio::time::timeout(timeout, body).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(Ok((value, mut close))) => {
                close.duration_ms = duration_ms;
                if close.status.is_none() {
                    close.status = Some(QueryStatus::Success);
                }
                self.store.finalize_query_audit(audit_id, &close).await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                let status = match e {
                    Error::Timeout(_) => QueryStatus::Timeout,
                    _ => QueryStatus::Error,
                };
                let close = AuditClose {
                    status: Some(status),
                    error_message: Some(e.to_string()),
                    error_code: Some(e.code().as_str().to_string()),
                    duration_ms,
                    ..AuditClose::default()
                };
                if let Err(audit_err) = self.store.finalize_query_audit(audit_id, &close).await {
                    warn!(error = %audit_err, "Failed to finalize query audit");
                }
                Err(e)
            }
            Err(_) => {
                let seconds = timeout.as_secs();
                let close = AuditClose {
                    status: Some(QueryStatus::Timeout),
                    error_message: Some(format!("Query timed out after {seconds} seconds")),
                    error_code: Some("QS003".to_string()),
                    duration_ms,
                    ..AuditClose::default()
                };
                if let Err(audit_err) = self.store.finalize_query_audit(audit_id, &close).await {
                    warn!(error = %audit_err, "Failed to finalize query audit");
                }
                Err(Error::Timeout(seconds))
            }
        }
    }

    // ========== Read operations ==========

    /// Golden-rules markdown, optionally filtered to categories.
    pub async fn get_golden_rules(
        &self,
        categories: Option<Vec<String>>,
        options: &CallOptions,
    ) -> Result<String> {
        let open = AuditOpen { query_type: "golden_rules".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let content = self.context.golden_rules(categories.as_deref()).await?;
            let close = AuditClose {
                golden_rules_returned: 1,
                tokens_approximated: Some((content.len() / 4) as i64),
                ..AuditClose::success(1)
            };
            Ok((content, close))
        })
        .await
    }

    /// Heuristics and learnings for one domain, location-scoped.
    pub async fn query_by_domain(
        &self,
        domain: &str,
        limit: i64,
        options: &CallOptions,
    ) -> Result<DomainQueryResult> {
        let open = AuditOpen {
            query_type: "domain".into(),
            domain: Some(domain.to_string()),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let domain = validate::validate_domain(domain)?;
            let limit = validate::validate_limit(limit)?;

            let heuristics = self
                .store
                .list_heuristics(&HeuristicQuery {
                    domain: Some(domain.clone()),
                    current_location: self.current_location.clone(),
                    include_dormant: false,
                    limit: Some(limit),
                })
                .await?;
            let learnings = self.store.list_learnings_by_domain(&domain, limit).await?;

            let result = DomainQueryResult {
                heuristic_count: heuristics.len(),
                learning_count: learnings.len(),
                domain,
                heuristics,
                learnings,
            };
            let close = AuditClose {
                heuristics_count: result.heuristic_count as i64,
                learnings_count: result.learning_count as i64,
                ..AuditClose::success((result.heuristic_count + result.learning_count) as i64)
            };
            Ok((result, close))
        })
        .await
    }

    /// Learnings matching any of the given tags.
    pub async fn query_by_tags(
        &self,
        tags: &[String],
        limit: i64,
        options: &CallOptions,
    ) -> Result<Vec<Learning>> {
        let open = AuditOpen {
            query_type: "tags".into(),
            tags: Some(tags.join(",")),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let tags = validate::validate_tags(tags)?;
            let limit = validate::validate_limit(limit)?;
            let learnings = self.store.list_learnings_by_tags(&tags, limit).await?;
            let close = AuditClose {
                learnings_count: learnings.len() as i64,
                ..AuditClose::success(learnings.len() as i64)
            };
            Ok((learnings, close))
        })
        .await
    }

    /// Most recent learnings, optionally filtered by type.
    pub async fn query_recent(
        &self,
        type_filter: Option<LearningType>,
        limit: i64,
        options: &CallOptions,
    ) -> Result<Vec<Learning>> {
        let open = AuditOpen {
            query_type: "recent".into(),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let limit = validate::validate_limit(limit)?;
            let learnings = self.store.list_recent_learnings(type_filter, limit).await?;
            let close = AuditClose {
                learnings_count: learnings.len() as i64,
                ..AuditClose::success(learnings.len() as i64)
            };
            Ok((learnings, close))
        })
        .await
    }

    /// Heuristics ranked against a task description. Degrades to the
    /// non-semantic fallback when no embedding backend is configured.
    pub async fn query_semantic(
        &self,
        task: &str,
        threshold: Option<f64>,
        limit: i64,
        domain: Option<&str>,
        options: &CallOptions,
    ) -> Result<Vec<ScoredHeuristic>> {
        let open = AuditOpen {
            query_type: "semantic".into(),
            domain: domain.map(str::to_string),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let task = validate::validate_query(task)?;
            let limit = validate::validate_limit(limit)?;
            let domain = domain.map(validate::validate_domain).transpose()?;
            let threshold = threshold.unwrap_or(self.config.context.semantic_threshold);

            let results = self
                .semantic
                .query(
                    &task,
                    threshold,
                    limit,
                    domain.as_deref(),
                    self.current_location.as_deref(),
                )
                .await?;
            let close = AuditClose {
                heuristics_count: results.len() as i64,
                ..AuditClose::success(results.len() as i64)
            };
            Ok((results, close))
        })
        .await
    }

    pub async fn get_active_experiments(
        &self,
        options: &CallOptions,
    ) -> Result<Vec<Experiment>> {
        let open = AuditOpen { query_type: "experiments".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let experiments = self.store.list_active_experiments().await?;
            let close = AuditClose {
                experiments_count: experiments.len() as i64,
                ..AuditClose::success(experiments.len() as i64)
            };
            Ok((experiments, close))
        })
        .await
    }

    pub async fn get_pending_ceo_reviews(&self, options: &CallOptions) -> Result<Vec<CeoReview>> {
        let open = AuditOpen { query_type: "ceo_reviews".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let reviews = self.store.list_pending_ceo_reviews().await?;
            let close = AuditClose {
                ceo_reviews_count: reviews.len() as i64,
                ..AuditClose::success(reviews.len() as i64)
            };
            Ok((reviews, close))
        })
        .await
    }

    pub async fn get_decisions(
        &self,
        domain: Option<&str>,
        status: DecisionStatus,
        limit: i64,
        options: &CallOptions,
    ) -> Result<Vec<Decision>> {
        let open = AuditOpen {
            query_type: "decisions".into(),
            domain: domain.map(str::to_string),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let domain = domain.map(validate::validate_domain).transpose()?;
            let limit = validate::validate_limit(limit)?;
            let decisions = self.store.list_decisions(domain.as_deref(), status, limit).await?;
            let count = decisions.len() as i64;
            Ok((decisions, AuditClose::success(count)))
        })
        .await
    }

    pub async fn get_invariants(
        &self,
        domain: Option<&str>,
        status: &str,
        limit: i64,
        options: &CallOptions,
    ) -> Result<Vec<Invariant>> {
        let open = AuditOpen {
            query_type: "invariants".into(),
            domain: domain.map(str::to_string),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let domain = domain.map(validate::validate_domain).transpose()?;
            let limit = validate::validate_limit(limit)?;
            let invariants = self.store.list_invariants(domain.as_deref(), status, limit).await?;
            let count = invariants.len() as i64;
            Ok((invariants, AuditClose::success(count)))
        })
        .await
    }

    pub async fn get_assumptions(
        &self,
        domain: Option<&str>,
        status: AssumptionStatus,
        limit: i64,
        options: &CallOptions,
    ) -> Result<Vec<Assumption>> {
        let open = AuditOpen {
            query_type: "assumptions".into(),
            domain: domain.map(str::to_string),
            limit_requested: Some(limit),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let domain = domain.map(validate::validate_domain).transpose()?;
            let limit = validate::validate_limit(limit)?;
            let assumptions =
                self.store.list_assumptions(domain.as_deref(), status, limit).await?;
            let count = assumptions.len() as i64;
            Ok((assumptions, AuditClose::success(count)))
        })
        .await
    }

    pub async fn get_violations(
        &self,
        days: i64,
        acknowledged: Option<bool>,
        options: &CallOptions,
    ) -> Result<Vec<Violation>> {
        let open = AuditOpen { query_type: "violations".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            if days < 1 {
                return Err(Error::Validation(format!("days must be positive, got {days}")));
            }
            let violations = self.store.list_violations(days, acknowledged).await?;
            let count = violations.len() as i64;
            Ok((violations, AuditClose::success(count)))
        })
        .await
    }

    pub async fn get_violation_summary(
        &self,
        days: i64,
        options: &CallOptions,
    ) -> Result<ViolationSummary> {
        let open = AuditOpen { query_type: "violation_summary".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            if days < 1 {
                return Err(Error::Validation(format!("days must be positive, got {days}")));
            }
            let summary = self.store.violation_summary(days).await?;
            let total = summary.total;
            Ok((summary, AuditClose::success(total)))
        })
        .await
    }

    /// Assemble a tiered context packet for a task.
    pub async fn build_context(
        &self,
        task: &str,
        domain: Option<&str>,
        tags: Option<&[String]>,
        max_tokens: i64,
        options: &CallOptions,
    ) -> Result<String> {
        let open = AuditOpen {
            query_type: "context".into(),
            domain: domain.map(str::to_string),
            tags: tags.map(|t| t.join(",")),
            max_tokens_requested: Some(max_tokens),
            query_summary: Some(task.chars().take(120).collect()),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let task = validate::validate_query(task)?;
            let domain = domain.map(validate::validate_domain).transpose()?;
            let tags = match tags {
                Some(tags) if !tags.is_empty() => validate::validate_tags(tags)?,
                _ => Vec::new(),
            };
            let max_tokens = validate::validate_max_tokens(
                if max_tokens > 0 { max_tokens } else { self.config.context.default_max_tokens },
            )?;

            let packet = self
                .context
                .build(&ContextRequest {
                    task,
                    domain,
                    tags,
                    max_tokens,
                    current_location: self.current_location.clone(),
                })
                .await?;
            let close = AuditClose {
                heuristics_count: packet.counts.heuristics,
                learnings_count: packet.counts.learnings,
                experiments_count: packet.counts.experiments,
                ceo_reviews_count: packet.counts.ceo_reviews,
                tokens_approximated: Some(packet.counts.approx_tokens),
                golden_rules_returned: 1,
                ..AuditClose::success(
                    packet.counts.heuristics + packet.counts.learnings,
                )
            };
            Ok((packet.content, close))
        })
        .await
    }

    pub async fn get_statistics(&self, options: &CallOptions) -> Result<Statistics> {
        let open = AuditOpen { query_type: "statistics".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let stats = self.store.statistics().await?;
            Ok((stats, AuditClose::success(1)))
        })
        .await
    }

    pub async fn validate_database(&self, options: &CallOptions) -> Result<ValidationReport> {
        let open = AuditOpen { query_type: "validate".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let report = self.store.validate_database().await?;
            Ok((report, AuditClose::success(1)))
        })
        .await
    }

    // ========== Metric and alert operations ==========

    pub async fn record_metric(
        &self,
        metric_name: &str,
        value: f64,
        domain: Option<&str>,
        metadata: Option<serde_json::Value>,
        options: &CallOptions,
    ) -> Result<i64> {
        let open = AuditOpen {
            query_type: "record_metric".into(),
            domain: domain.map(str::to_string),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            if metric_name.trim().is_empty() {
                return Err(Error::Validation("metric name cannot be empty".into()));
            }
            let domain = domain.map(validate::validate_domain).transpose()?;
            let id = self
                .meta
                .record_metric(metric_name.trim(), value, domain.as_deref(), metadata.as_ref())
                .await?;
            Ok((id, AuditClose::success(1)))
        })
        .await
    }

    pub async fn check_alerts(&self, options: &CallOptions) -> Result<CheckOutcome> {
        let open = AuditOpen { query_type: "check_alerts".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let outcome = self.meta.check_alerts().await?;
            let count = outcome.alerts.len() as i64;
            Ok((outcome, AuditClose::success(count)))
        })
        .await
    }

    pub async fn acknowledge_alert(&self, alert_id: i64, options: &CallOptions) -> Result<bool> {
        let open = AuditOpen { query_type: "acknowledge_alert".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let changed = self.meta.acknowledge_alert(alert_id).await?;
            Ok((changed, AuditClose::success(i64::from(changed))))
        })
        .await
    }

    pub async fn resolve_alert(&self, alert_id: i64, options: &CallOptions) -> Result<bool> {
        let open = AuditOpen { query_type: "resolve_alert".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let changed = self.meta.resolve_alert(alert_id).await?;
            Ok((changed, AuditClose::success(i64::from(changed))))
        })
        .await
    }

    pub async fn get_active_alerts(&self, options: &CallOptions) -> Result<Vec<MetaAlert>> {
        let open = AuditOpen { query_type: "active_alerts".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let alerts = self.meta.active_alerts(None).await?;
            let count = alerts.len() as i64;
            Ok((alerts, AuditClose::success(count)))
        })
        .await
    }

    // ========== Write operations ==========

    /// Record a learning and revive any dormant heuristics whose conditions
    /// match its tags.
    pub async fn record_learning(
        &self,
        new: NewLearning,
        options: &CallOptions,
    ) -> Result<Learning> {
        let open = AuditOpen {
            query_type: "record_learning".into(),
            domain: new.domain.clone(),
            tags: new.tags.clone(),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            if new.filepath.trim().is_empty() {
                return Err(Error::Validation("learning filepath cannot be empty".into()));
            }
            if new.title.trim().is_empty() {
                return Err(Error::Validation("learning title cannot be empty".into()));
            }
            if !(1..=5).contains(&new.severity) {
                return Err(Error::Validation(format!(
                    "severity must be in [1, 5], got {}",
                    new.severity
                )));
            }
            let mut new = new;
            if let Some(domain) = new.domain.take() {
                new.domain = Some(validate::validate_domain(&domain)?);
            }
            let learning = self.store.insert_learning(&new).await?;

            let tokens: Vec<String> =
                learning.tag_list().iter().map(|t| (*t).to_string()).collect();
            let revived = self.lifecycle.revive_matching(&tokens).await?;
            if !revived.is_empty() {
                debug!(count = revived.len(), "Learning revived dormant heuristics");
            }

            let close = AuditClose { learnings_count: 1, ..AuditClose::success(1) };
            Ok((learning, close))
        })
        .await
    }

    /// Record a heuristic through the lifecycle engine (capacity admission,
    /// quality checklist, markdown rollup append).
    pub async fn record_heuristic(
        &self,
        params: RecordHeuristicParams,
        options: &CallOptions,
    ) -> Result<RecordedHeuristic> {
        let open = AuditOpen {
            query_type: "record_heuristic".into(),
            domain: Some(params.domain.clone()),
            ..AuditOpen::default()
        };
        self.run_audited(open, options, async {
            let domain = validate::sanitize_domain(&params.domain);
            if domain.is_empty() {
                return Err(Error::Validation(
                    "Domain is empty after sanitization.".into(),
                ));
            }
            let rule = validate::validate_rule(&params.rule)?;
            let explanation = validate::validate_explanation(&params.explanation)?;
            let confidence =
                if (0.0..=1.0).contains(&params.confidence) { params.confidence } else { 0.7 };

            let recorded = self
                .lifecycle
                .record_heuristic(&NewHeuristic {
                    domain,
                    rule,
                    explanation: (!explanation.is_empty()).then_some(explanation),
                    source_type: params.source_type,
                    source_id: None,
                    confidence,
                    times_validated: 0,
                    is_golden: params.is_golden,
                    project_path: params.project_path.clone(),
                })
                .await?;

            if let Err(e) =
                markdown::append_domain_entry(&self.config.heuristics_dir(), &recorded.heuristic)
                    .await
            {
                warn!(error = %e, "Failed to append heuristic rollup entry");
            }

            let close = AuditClose { heuristics_count: 1, ..AuditClose::success(1) };
            Ok((recorded, close))
        })
        .await
    }

    /// Apply a typed confidence event, lifecycle-gated.
    pub async fn update_confidence(
        &self,
        heuristic_id: i64,
        event: UpdateType,
        reason: Option<String>,
        options: &CallOptions,
    ) -> Result<ConfidenceUpdate> {
        let open = AuditOpen { query_type: "update_confidence".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let update = self
                .lifecycle
                .update_confidence(
                    heuristic_id,
                    &UpdateRequest {
                        event,
                        reason,
                        session_id: options.session_id.clone(),
                        agent_id: options.agent_id.clone(),
                    },
                )
                .await?;
            Ok((update, AuditClose::success(1)))
        })
        .await
    }

    pub async fn record_violation(
        &self,
        rule_id: i64,
        rule_name: &str,
        description: Option<&str>,
        options: &CallOptions,
    ) -> Result<Violation> {
        let open = AuditOpen { query_type: "record_violation".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            if rule_name.trim().is_empty() {
                return Err(Error::Validation("rule name cannot be empty".into()));
            }
            let violation = self
                .store
                .insert_violation(
                    rule_id,
                    rule_name.trim(),
                    description,
                    options.session_id.as_deref(),
                )
                .await?;
            Ok((violation, AuditClose::success(1)))
        })
        .await
    }

    pub async fn acknowledge_violation(
        &self,
        violation_id: i64,
        options: &CallOptions,
    ) -> Result<bool> {
        let open =
            AuditOpen { query_type: "acknowledge_violation".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let changed = self.store.acknowledge_violation(violation_id).await?;
            Ok((changed, AuditClose::success(i64::from(changed))))
        })
        .await
    }

    /// Store a privacy-reduced session context for selectivity analysis.
    pub async fn record_session_context(
        &self,
        session_id: &str,
        context_text: &str,
        heuristics_applied: &[i64],
        options: &CallOptions,
    ) -> Result<()> {
        let open = AuditOpen { query_type: "session_context".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            self.fraud
                .track_context(
                    session_id,
                    context_text,
                    heuristics_applied,
                    options.agent_id.as_deref(),
                )
                .await?;
            Ok(((), AuditClose::success(1)))
        })
        .await
    }

    // ========== Engine entry points ==========

    /// Extract patterns from a session log (path or inline text).
    pub async fn observe_session(
        &self,
        source: LogSource,
        session_id: Option<&str>,
        project_path: Option<&str>,
        persist: bool,
        options: &CallOptions,
    ) -> Result<ObservationSummary> {
        let open = AuditOpen { query_type: "observe_session".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let summary = match &source {
                LogSource::Path(path) => {
                    self.observer.observe_file(path, session_id, project_path, persist).await?
                }
                LogSource::Text(text) => {
                    let session_id = session_id.unwrap_or("inline");
                    self.observer.observe_text(text, session_id, project_path, persist).await?
                }
            };

            // Observation triggers can revive dormant heuristics
            if persist && !summary.patterns.is_empty() {
                let tokens: Vec<String> =
                    summary.patterns.iter().map(|p| p.domain.clone()).collect();
                self.lifecycle.revive_matching(&tokens).await?;
            }

            let count = summary.patterns_extracted as i64;
            Ok((summary, AuditClose::success(count)))
        })
        .await
    }

    /// Run the distillation cycle (decay, promotion, golden-rules append).
    pub async fn run_distillation(
        &self,
        project_path: Option<&str>,
        auto_append: bool,
        dry_run: bool,
        options: &CallOptions,
    ) -> Result<DistillationSummary> {
        let open = AuditOpen { query_type: "distillation".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let summary = self.distiller.run(project_path, auto_append, dry_run).await?;
            let count = summary.patterns_promoted as i64;
            Ok((summary, AuditClose::success(count)))
        })
        .await
    }

    /// Run fraud detection on one heuristic.
    pub async fn run_fraud_check(
        &self,
        heuristic_id: i64,
        options: &CallOptions,
    ) -> Result<FraudReport> {
        let open = AuditOpen { query_type: "fraud_check".into(), ..AuditOpen::default() };
        self.run_audited(open, options, async {
            let report = self.fraud.run_check(heuristic_id).await?;
            Ok((report, AuditClose::success(1)))
        })
        .await
    }
}
