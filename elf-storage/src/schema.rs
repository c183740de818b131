//! Database schema definitions.
//!
//! All timestamps are INTEGER Unix milliseconds (UTC). Dates are TEXT
//! `YYYY-MM-DD`. Enum-valued columns hold their snake_case string form and
//! are CHECK-constrained where the value set is closed.

/// Current schema version, recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 3;

pub const CREATE_SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL,
    description TEXT
)
"#;

pub const CREATE_LEARNINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS learnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL CHECK(type IN ('failure', 'success', 'heuristic', 'experiment', 'observation')),
    filepath TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    summary TEXT,
    tags TEXT,
    domain TEXT,
    severity INTEGER NOT NULL DEFAULT 3 CHECK(severity >= 1 AND severity <= 5),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_HEURISTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS heuristics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    rule TEXT NOT NULL,
    explanation TEXT,
    source_type TEXT,
    source_id INTEGER,
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    confidence_ema REAL CHECK(confidence_ema IS NULL OR (confidence_ema >= 0.0 AND confidence_ema <= 1.0)),
    ema_alpha REAL,
    ema_warmup_remaining INTEGER NOT NULL DEFAULT 0,
    times_validated INTEGER NOT NULL DEFAULT 0 CHECK(times_validated >= 0),
    times_violated INTEGER NOT NULL DEFAULT 0 CHECK(times_violated >= 0),
    times_contradicted INTEGER NOT NULL DEFAULT 0 CHECK(times_contradicted >= 0),
    times_revived INTEGER NOT NULL DEFAULT 0 CHECK(times_revived >= 0),
    is_golden INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'dormant', 'quarantined', 'evicted')),
    dormant_since INTEGER,
    revival_conditions TEXT,
    last_used_at INTEGER,
    last_confidence_update INTEGER,
    update_count_today INTEGER NOT NULL DEFAULT 0,
    update_count_reset_date TEXT,
    min_applications INTEGER NOT NULL DEFAULT 10,
    fraud_flags INTEGER NOT NULL DEFAULT 0,
    is_quarantined INTEGER NOT NULL DEFAULT 0,
    last_fraud_check INTEGER,
    project_path TEXT DEFAULT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// NULL project paths collapse to '' so global rules cannot be duplicated
pub const CREATE_HEURISTICS_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_heuristics_unique_rule
ON heuristics(domain, rule, IFNULL(project_path, ''))
"#;

pub const CREATE_PATTERNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_type TEXT NOT NULL CHECK(pattern_type IN ('retry', 'error', 'search', 'success_sequence', 'tool_sequence')),
    pattern_text TEXT NOT NULL,
    signature TEXT NOT NULL,
    pattern_hash TEXT NOT NULL UNIQUE,
    occurrence_count INTEGER NOT NULL DEFAULT 1 CHECK(occurrence_count >= 1),
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    session_ids TEXT NOT NULL DEFAULT '[]',
    domain TEXT NOT NULL DEFAULT 'general',
    project_path TEXT DEFAULT NULL,
    strength REAL NOT NULL DEFAULT 0.3 CHECK(strength >= 0.0 AND strength <= 1.0),
    promoted_to_heuristic_id INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_CONFIDENCE_UPDATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS confidence_updates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    heuristic_id INTEGER NOT NULL,
    old_confidence REAL NOT NULL,
    new_confidence REAL NOT NULL,
    delta REAL NOT NULL,
    update_type TEXT NOT NULL CHECK(update_type IN ('success', 'failure', 'contradiction', 'revival', 'decay', 'manual')),
    reason TEXT,
    session_id TEXT,
    agent_id TEXT,
    rate_limited INTEGER NOT NULL DEFAULT 0,
    raw_target_confidence REAL,
    smoothed_delta REAL,
    alpha_used REAL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
)
"#;

pub const CREATE_DOMAIN_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS domain_metadata (
    domain TEXT PRIMARY KEY,
    soft_limit INTEGER NOT NULL DEFAULT 5 CHECK(soft_limit > 0),
    hard_limit INTEGER NOT NULL DEFAULT 10 CHECK(hard_limit >= soft_limit),
    ceo_override_limit INTEGER CHECK(ceo_override_limit IS NULL OR ceo_override_limit >= hard_limit),
    current_count INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'normal' CHECK(state IN ('normal', 'overflow', 'critical')),
    overflow_entered_at INTEGER,
    expansion_min_confidence REAL NOT NULL DEFAULT 0.70 CHECK(expansion_min_confidence >= 0.0 AND expansion_min_confidence <= 1.0),
    expansion_min_validations INTEGER NOT NULL DEFAULT 3,
    expansion_min_novelty REAL NOT NULL DEFAULT 0.60 CHECK(expansion_min_novelty >= 0.0 AND expansion_min_novelty <= 1.0),
    grace_period_days INTEGER NOT NULL DEFAULT 7,
    max_overflow_days INTEGER NOT NULL DEFAULT 28,
    avg_confidence REAL,
    health_score REAL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// Keep `current_count`/`state`/`overflow_entered_at` in sync with the
/// active heuristic population, whichever code path mutated it.
pub const CREATE_DOMAIN_SYNC_INSERT_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS sync_domain_counts_on_insert
AFTER INSERT ON heuristics
FOR EACH ROW
BEGIN
    INSERT OR IGNORE INTO domain_metadata(domain, created_at, updated_at)
    VALUES (NEW.domain, CAST(strftime('%s', 'now') AS INTEGER) * 1000, CAST(strftime('%s', 'now') AS INTEGER) * 1000);
    UPDATE domain_metadata
    SET
        current_count = (
            SELECT COUNT(*) FROM heuristics
            WHERE domain = NEW.domain AND status = 'active'
        ),
        state = CASE
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > hard_limit THEN 'critical'
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > soft_limit THEN 'overflow'
            ELSE 'normal'
        END,
        overflow_entered_at = CASE
            WHEN state = 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > soft_limit
                THEN CAST(strftime('%s', 'now') AS INTEGER) * 1000
            WHEN state != 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') <= soft_limit
                THEN NULL
            ELSE overflow_entered_at
        END,
        updated_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000
    WHERE domain = NEW.domain;
END
"#;

pub const CREATE_DOMAIN_SYNC_UPDATE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS sync_domain_counts_on_update
AFTER UPDATE ON heuristics
FOR EACH ROW
BEGIN
    INSERT OR IGNORE INTO domain_metadata(domain, created_at, updated_at)
    VALUES (NEW.domain, CAST(strftime('%s', 'now') AS INTEGER) * 1000, CAST(strftime('%s', 'now') AS INTEGER) * 1000);
    UPDATE domain_metadata
    SET
        current_count = (
            SELECT COUNT(*) FROM heuristics
            WHERE domain = NEW.domain AND status = 'active'
        ),
        state = CASE
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > hard_limit THEN 'critical'
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > soft_limit THEN 'overflow'
            ELSE 'normal'
        END,
        overflow_entered_at = CASE
            WHEN state = 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') > soft_limit
                THEN CAST(strftime('%s', 'now') AS INTEGER) * 1000
            WHEN state != 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = NEW.domain AND status = 'active') <= soft_limit
                THEN NULL
            ELSE overflow_entered_at
        END,
        updated_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000
    WHERE domain = NEW.domain;
END
"#;

pub const CREATE_DOMAIN_SYNC_DELETE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS sync_domain_counts_on_delete
AFTER DELETE ON heuristics
FOR EACH ROW
BEGIN
    UPDATE domain_metadata
    SET
        current_count = (
            SELECT COUNT(*) FROM heuristics
            WHERE domain = OLD.domain AND status = 'active'
        ),
        state = CASE
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = OLD.domain AND status = 'active') > hard_limit THEN 'critical'
            WHEN (SELECT COUNT(*) FROM heuristics WHERE domain = OLD.domain AND status = 'active') > soft_limit THEN 'overflow'
            ELSE 'normal'
        END,
        overflow_entered_at = CASE
            WHEN state = 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = OLD.domain AND status = 'active') > soft_limit
                THEN CAST(strftime('%s', 'now') AS INTEGER) * 1000
            WHEN state != 'normal' AND (SELECT COUNT(*) FROM heuristics WHERE domain = OLD.domain AND status = 'active') <= soft_limit
                THEN NULL
            ELSE overflow_entered_at
        END,
        updated_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000
    WHERE domain = OLD.domain;
END
"#;

/// Eviction scoring: confidence x recency bucket x evidence bucket,
/// lowest first. Timestamps are millis, hence the /86400000.0.
pub const CREATE_EVICTION_CANDIDATES_VIEW: &str = r#"
CREATE VIEW IF NOT EXISTS eviction_candidates AS
SELECT
    h.id,
    h.domain,
    h.rule,
    h.status,
    h.confidence,
    h.times_validated,
    h.times_violated,
    h.times_contradicted,
    h.last_used_at,
    h.created_at,
    h.confidence *
    (CASE
        WHEN h.last_used_at IS NULL THEN 0.25
        WHEN (CAST(strftime('%s', 'now') AS INTEGER) * 1000 - h.last_used_at) / 86400000.0 > 90 THEN 0.1
        WHEN (CAST(strftime('%s', 'now') AS INTEGER) * 1000 - h.last_used_at) / 86400000.0 > 60 THEN 0.3
        WHEN (CAST(strftime('%s', 'now') AS INTEGER) * 1000 - h.last_used_at) / 86400000.0 > 30 THEN 0.5
        WHEN (CAST(strftime('%s', 'now') AS INTEGER) * 1000 - h.last_used_at) / 86400000.0 > 14 THEN 0.7
        WHEN (CAST(strftime('%s', 'now') AS INTEGER) * 1000 - h.last_used_at) / 86400000.0 > 7 THEN 0.85
        ELSE 1.0
    END) *
    (CASE
        WHEN h.times_validated = 0 THEN 0.5
        WHEN h.times_validated < 3 THEN 0.7
        WHEN h.times_validated < 10 THEN 0.85
        ELSE 1.0
    END) AS eviction_score,
    (h.times_validated + h.times_violated + h.times_contradicted) AS total_applications
FROM heuristics h
WHERE h.status IN ('active', 'dormant')
ORDER BY eviction_score ASC
"#;

pub const CREATE_DOMAIN_BASELINES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS domain_baselines (
    domain TEXT PRIMARY KEY,
    avg_success_rate REAL NOT NULL,
    std_success_rate REAL NOT NULL,
    avg_update_frequency REAL NOT NULL DEFAULT 0,
    std_update_frequency REAL NOT NULL DEFAULT 0,
    sample_count INTEGER NOT NULL DEFAULT 0,
    last_updated INTEGER NOT NULL
)
"#;

pub const CREATE_DOMAIN_BASELINE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS domain_baseline_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    avg_success_rate REAL NOT NULL,
    std_success_rate REAL NOT NULL,
    avg_update_frequency REAL,
    std_update_frequency REAL,
    sample_count INTEGER NOT NULL,
    prev_avg_success_rate REAL,
    prev_std_success_rate REAL,
    drift_percentage REAL,
    is_significant_drift INTEGER NOT NULL DEFAULT 0,
    calculated_at INTEGER NOT NULL
)
"#;

pub const CREATE_FRAUD_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fraud_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    heuristic_id INTEGER NOT NULL,
    fraud_score REAL NOT NULL,
    classification TEXT NOT NULL CHECK(classification IN ('clean', 'low_confidence', 'suspicious', 'fraud_likely', 'fraud_confirmed')),
    likelihood_ratio REAL,
    signal_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    reviewed_at INTEGER,
    reviewed_by TEXT,
    review_outcome TEXT,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
)
"#;

pub const CREATE_ANOMALY_SIGNALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS anomaly_signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fraud_report_id INTEGER NOT NULL,
    heuristic_id INTEGER NOT NULL,
    detector_name TEXT NOT NULL,
    score REAL NOT NULL,
    severity TEXT NOT NULL,
    reason TEXT NOT NULL,
    evidence TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (fraud_report_id) REFERENCES fraud_reports(id) ON DELETE CASCADE,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
)
"#;

pub const CREATE_FRAUD_RESPONSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fraud_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fraud_report_id INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    parameters TEXT,
    executed_at INTEGER NOT NULL,
    executed_by TEXT NOT NULL DEFAULT 'system',
    rollback_at INTEGER,
    FOREIGN KEY (fraud_report_id) REFERENCES fraud_reports(id) ON DELETE CASCADE
)
"#;

pub const CREATE_SESSION_CONTEXTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS session_contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    agent_id TEXT,
    context_hash TEXT NOT NULL,
    context_preview TEXT,
    heuristics_applied TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_METRIC_OBSERVATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metric_observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    observed_at INTEGER NOT NULL,
    domain TEXT,
    metadata TEXT
)
"#;

pub const CREATE_METRIC_OBSERVATIONS_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_obs_unique
ON metric_observations(metric_name, observed_at, IFNULL(domain, ''))
"#;

pub const CREATE_METRIC_HOURLY_ROLLUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metric_hourly_rollups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name TEXT NOT NULL,
    hour_start INTEGER NOT NULL,
    domain TEXT,
    min_value REAL,
    max_value REAL,
    avg_value REAL,
    sample_count INTEGER
)
"#;

pub const CREATE_METRIC_ROLLUPS_UNIQUE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_rollup_unique
ON metric_hourly_rollups(metric_name, hour_start, IFNULL(domain, ''))
"#;

pub const CREATE_META_ALERTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL CHECK(severity IN ('info', 'warning', 'critical')),
    state TEXT NOT NULL DEFAULT 'new' CHECK(state IN ('new', 'active', 'ack', 'resolved')),
    metric_name TEXT,
    current_value REAL,
    baseline_value REAL,
    message TEXT NOT NULL,
    context TEXT,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    acknowledged_at INTEGER,
    resolved_at INTEGER,
    created_by TEXT NOT NULL DEFAULT 'meta_observer'
)
"#;

pub const CREATE_META_OBSERVER_CONFIG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta_observer_config (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name TEXT UNIQUE NOT NULL,
    z_score_threshold REAL NOT NULL DEFAULT 3.0,
    trend_window_hours INTEGER NOT NULL DEFAULT 168,
    trend_sensitivity REAL NOT NULL DEFAULT 0.05,
    baseline_window_hours INTEGER NOT NULL DEFAULT 720,
    false_positive_count INTEGER NOT NULL DEFAULT 0,
    true_positive_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_DECISIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    context TEXT NOT NULL,
    options_considered TEXT,
    decision TEXT NOT NULL,
    rationale TEXT NOT NULL,
    domain TEXT,
    status TEXT NOT NULL DEFAULT 'accepted' CHECK(status IN ('accepted', 'proposed', 'superseded')),
    superseded_by INTEGER REFERENCES decisions(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_INVARIANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS invariants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    statement TEXT NOT NULL,
    rationale TEXT NOT NULL,
    domain TEXT,
    scope TEXT NOT NULL DEFAULT 'codebase' CHECK(scope IN ('codebase', 'module', 'function', 'runtime')),
    validation_type TEXT,
    severity TEXT NOT NULL DEFAULT 'error' CHECK(severity IN ('error', 'warning', 'info')),
    status TEXT NOT NULL DEFAULT 'active',
    violation_count INTEGER NOT NULL DEFAULT 0,
    last_validated_at INTEGER,
    last_violated_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_VIOLATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id INTEGER NOT NULL,
    rule_name TEXT NOT NULL,
    violation_date INTEGER NOT NULL,
    description TEXT,
    session_id TEXT,
    acknowledged INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_EXPERIMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    hypothesis TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    cycles_run INTEGER NOT NULL DEFAULT 0,
    folder_path TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_CEO_REVIEWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ceo_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    context TEXT,
    recommendation TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    reviewed_at INTEGER
)
"#;

pub const CREATE_ASSUMPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS assumptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assumption TEXT NOT NULL,
    context TEXT,
    source TEXT,
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'verified', 'challenged', 'invalidated')),
    domain TEXT,
    verified_count INTEGER NOT NULL DEFAULT 0,
    challenged_count INTEGER NOT NULL DEFAULT 0,
    last_verified_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_BUILDING_QUERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS building_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_type TEXT NOT NULL,
    session_id TEXT,
    agent_id TEXT,
    domain TEXT,
    tags TEXT,
    limit_requested INTEGER,
    max_tokens_requested INTEGER,
    results_returned INTEGER,
    tokens_approximated INTEGER,
    duration_ms INTEGER,
    status TEXT NOT NULL DEFAULT 'success' CHECK(status IN ('success', 'error', 'timeout')),
    error_message TEXT,
    error_code TEXT,
    golden_rules_returned INTEGER NOT NULL DEFAULT 0,
    heuristics_count INTEGER NOT NULL DEFAULT 0,
    learnings_count INTEGER NOT NULL DEFAULT 0,
    experiments_count INTEGER NOT NULL DEFAULT 0,
    ceo_reviews_count INTEGER NOT NULL DEFAULT 0,
    query_summary TEXT,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
)
"#;

pub const CREATE_SESSION_SUMMARIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS session_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    project TEXT NOT NULL,
    tool_summary TEXT,
    content_summary TEXT,
    conversation_summary TEXT,
    files_touched TEXT NOT NULL DEFAULT '[]',
    message_count INTEGER NOT NULL DEFAULT 0,
    summarized_at INTEGER NOT NULL
)
"#;

pub const CREATE_SPIKE_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS spike_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    topic TEXT,
    question TEXT,
    findings TEXT,
    domain TEXT,
    tags TEXT,
    usefulness_score REAL NOT NULL DEFAULT 0,
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// Secondary indexes for the hot query paths
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_learnings_domain ON learnings(domain)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_type ON learnings(type)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_created_at ON learnings(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_domain_created ON learnings(domain, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_heuristics_domain ON heuristics(domain)",
    "CREATE INDEX IF NOT EXISTS idx_heuristics_golden ON heuristics(is_golden)",
    "CREATE INDEX IF NOT EXISTS idx_heuristics_status ON heuristics(status)",
    "CREATE INDEX IF NOT EXISTS idx_heuristics_domain_confidence ON heuristics(domain, confidence DESC)",
    "CREATE INDEX IF NOT EXISTS idx_heuristics_fraud_check ON heuristics(last_fraud_check)",
    "CREATE INDEX IF NOT EXISTS idx_patterns_hash ON patterns(pattern_hash)",
    "CREATE INDEX IF NOT EXISTS idx_patterns_promoted ON patterns(promoted_to_heuristic_id)",
    "CREATE INDEX IF NOT EXISTS idx_conf_updates_heuristic ON confidence_updates(heuristic_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_obs_metric_time ON metric_observations(metric_name, observed_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_state ON meta_alerts(state, severity, first_seen DESC)",
    "CREATE INDEX IF NOT EXISTS idx_fraud_reports_heuristic ON fraud_reports(heuristic_id)",
    "CREATE INDEX IF NOT EXISTS idx_anomaly_signals_heuristic ON anomaly_signals(heuristic_id)",
    "CREATE INDEX IF NOT EXISTS idx_session_contexts_created ON session_contexts(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_violations_date ON violations(violation_date)",
    "CREATE INDEX IF NOT EXISTS idx_violations_acknowledged ON violations(acknowledged)",
    "CREATE INDEX IF NOT EXISTS idx_decisions_domain ON decisions(domain)",
    "CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(status)",
    "CREATE INDEX IF NOT EXISTS idx_invariants_status ON invariants(status)",
    "CREATE INDEX IF NOT EXISTS idx_assumptions_status ON assumptions(status)",
    "CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status)",
    "CREATE INDEX IF NOT EXISTS idx_ceo_reviews_status ON ceo_reviews(status)",
    "CREATE INDEX IF NOT EXISTS idx_building_queries_type ON building_queries(query_type)",
    "CREATE INDEX IF NOT EXISTS idx_building_queries_created ON building_queries(created_at DESC)",
];

/// Table DDL in creation order
pub const CREATE_TABLES: &[&str] = &[
    CREATE_SCHEMA_VERSION_TABLE,
    CREATE_LEARNINGS_TABLE,
    CREATE_HEURISTICS_TABLE,
    CREATE_PATTERNS_TABLE,
    CREATE_CONFIDENCE_UPDATES_TABLE,
    CREATE_DOMAIN_METADATA_TABLE,
    CREATE_DOMAIN_BASELINES_TABLE,
    CREATE_DOMAIN_BASELINE_HISTORY_TABLE,
    CREATE_FRAUD_REPORTS_TABLE,
    CREATE_ANOMALY_SIGNALS_TABLE,
    CREATE_FRAUD_RESPONSES_TABLE,
    CREATE_SESSION_CONTEXTS_TABLE,
    CREATE_METRIC_OBSERVATIONS_TABLE,
    CREATE_METRIC_HOURLY_ROLLUPS_TABLE,
    CREATE_META_ALERTS_TABLE,
    CREATE_META_OBSERVER_CONFIG_TABLE,
    CREATE_DECISIONS_TABLE,
    CREATE_INVARIANTS_TABLE,
    CREATE_VIOLATIONS_TABLE,
    CREATE_EXPERIMENTS_TABLE,
    CREATE_CEO_REVIEWS_TABLE,
    CREATE_ASSUMPTIONS_TABLE,
    CREATE_BUILDING_QUERIES_TABLE,
    CREATE_SESSION_SUMMARIES_TABLE,
    CREATE_SPIKE_REPORTS_TABLE,
];

/// Unique indexes, triggers, and views
pub const CREATE_CONSTRAINTS: &[&str] = &[
    CREATE_HEURISTICS_UNIQUE_INDEX,
    CREATE_METRIC_OBSERVATIONS_UNIQUE_INDEX,
    CREATE_METRIC_ROLLUPS_UNIQUE_INDEX,
    CREATE_DOMAIN_SYNC_INSERT_TRIGGER,
    CREATE_DOMAIN_SYNC_UPDATE_TRIGGER,
    CREATE_DOMAIN_SYNC_DELETE_TRIGGER,
    CREATE_EVICTION_CANDIDATES_VIEW,
];

/// Tables `validate_database` requires to exist
pub const REQUIRED_TABLES: &[&str] = &[
    "learnings",
    "heuristics",
    "patterns",
    "confidence_updates",
    "domain_metadata",
    "domain_baselines",
    "fraud_reports",
    "anomaly_signals",
    "metric_observations",
    "meta_alerts",
    "decisions",
    "invariants",
    "violations",
    "experiments",
    "ceo_reviews",
    "building_queries",
    "session_summaries",
    "spike_reports",
];
