//! Entity types persisted by the knowledge store.
//!
//! Every row type carries `id`, `created_at`, and `updated_at` where the
//! schema does; all timestamps are UTC. Enum-valued columns round-trip
//! through their snake_case string form.

mod audit;
mod domain;
mod fraud;
mod heuristic;
mod learning;
mod meta;
mod pattern;
mod records;

pub use audit::{QueryAudit, QueryStatus, Statistics, ValidationReport};
pub use domain::{DomainMetadata, DomainState};
pub use fraud::{
    AnomalySignal, DomainBaseline, FraudClassification, FraudReport, SessionContextRecord,
    SignalSeverity,
};
pub use heuristic::{
    ConfidenceUpdate, Heuristic, HeuristicStatus, NewHeuristic, SourceType, UpdateType,
};
pub use learning::{Learning, LearningType, NewLearning};
pub use meta::{
    Anomaly, AlertSeverity, AlertState, MetaAlert, MetricConfig, MetricObservation, Trend,
    TrendConfidence, TrendDirection,
};
pub use pattern::{ExtractedPattern, Pattern, PatternKind};
pub use records::{
    Assumption, AssumptionStatus, CeoReview, Decision, DecisionStatus, Experiment, Invariant,
    InvariantScope, InvariantSeverity, Violation, ViolationSummary,
};
