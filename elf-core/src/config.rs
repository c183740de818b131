//! Service configuration.
//!
//! Configuration is a plain struct loaded once at startup: built-in defaults,
//! overlaid with the global TOML file under the data root, overlaid with an
//! optional per-project file (deep merge, project wins). No ambient globals;
//! the loaded value hangs off the service.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data root relative to `$HOME`
pub const DEFAULT_DATA_ROOT: &str = ".claude/emergent-learning";
/// Global config filename under the data root
pub const CONFIG_FILE: &str = "config.toml";
/// Per-project override, relative to the project path
pub const PROJECT_CONFIG_FILE: &str = ".elf/config.toml";

/// Top-level configuration for the knowledge core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElfConfig {
    /// Root directory holding `memory/index.db`, markdown files, and caches
    pub data_root: PathBuf,
    pub lifecycle: LifecycleConfig,
    pub distill: DistillConfig,
    pub fraud: FraudConfig,
    pub meta: MetaConfig,
    pub context: ContextConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for ElfConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_root: home.join(DEFAULT_DATA_ROOT),
            lifecycle: LifecycleConfig::default(),
            distill: DistillConfig::default(),
            fraud: FraudConfig::default(),
            meta: MetaConfig::default(),
            context: ContextConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ElfConfig {
    /// `memory/` directory under the data root.
    pub fn memory_dir(&self) -> PathBuf {
        self.data_root.join("memory")
    }

    /// Path to the relational store.
    pub fn db_path(&self) -> PathBuf {
        self.memory_dir().join("index.db")
    }

    /// Path to the golden-rules markdown file.
    pub fn golden_rules_path(&self) -> PathBuf {
        self.memory_dir().join("golden-rules.md")
    }

    /// Per-domain heuristic rollup directory.
    pub fn heuristics_dir(&self) -> PathBuf {
        self.memory_dir().join("heuristics")
    }

    /// Embedding cache directory.
    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.data_root.join(".embedding_cache")
    }

    /// Load configuration: defaults, then the global file under `data_root`
    /// (when present), then the project override (when present). Later
    /// layers win key-by-key.
    pub fn load(data_root: Option<&Path>, project_path: Option<&Path>) -> Result<Self> {
        let mut base = ElfConfig::default();
        if let Some(root) = data_root {
            base.data_root = root.to_path_buf();
        }

        let mut value = toml::Value::try_from(&base)
            .map_err(|e| Error::Configuration(format!("Failed to encode default config: {e}")))?;

        let global_file = base.data_root.join(CONFIG_FILE);
        if let Some(layer) = read_toml(&global_file)? {
            deep_merge(&mut value, layer);
        }
        if let Some(project) = project_path {
            let project_file = project.join(PROJECT_CONFIG_FILE);
            if let Some(layer) = read_toml(&project_file)? {
                deep_merge(&mut value, layer);
            }
        }

        let mut merged: ElfConfig = value
            .try_into()
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {e}")))?;
        // The data root itself is never overridable from a project file
        if let Some(root) = data_root {
            merged.data_root = root.to_path_buf();
        }
        Ok(merged)
    }
}

fn read_toml(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("Failed to read {}: {e}", path.display())))?;
    let table = text
        .parse::<toml::Table>()
        .map_err(|e| Error::Configuration(format!("Failed to parse {}: {e}", path.display())))?;
    Ok(Some(toml::Value::Table(table)))
}

/// Recursively merge `overlay` into `base`; tables merge key-by-key,
/// everything else is replaced by the overlay.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Lifecycle-engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// EMA smoothing factor applied after warmup
    pub ema_alpha: f64,
    /// Number of unsmoothed updates for a new heuristic
    pub ema_warmup_updates: i64,
    /// Confidence floor below which a well-applied heuristic goes dormant
    pub dormancy_threshold: f64,
    pub default_soft_limit: i64,
    pub default_hard_limit: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            ema_warmup_updates: 3,
            dormancy_threshold: 0.20,
            default_soft_limit: 5,
            default_hard_limit: 10,
        }
    }
}

/// Distillation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    /// Pattern strength halves every this many days without reinforcement
    pub decay_half_life_days: f64,
    /// Strength floor; decay never deletes
    pub decay_floor: f64,
    /// Token budget for the auto-distilled golden-rules section
    pub token_budget: i64,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self { decay_half_life_days: 7.0, decay_floor: 0.01, token_budget: 2000 }
    }
}

/// Fraud-detection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Bayesian prior fraud rate
    pub prior_fraud_rate: f64,
    pub threshold_suspicious: f64,
    pub threshold_fraud_likely: f64,
    pub threshold_fraud_confirmed: f64,
    pub success_rate_z_threshold: f64,
    pub temporal_score_threshold: f64,
    pub trajectory_score_threshold: f64,
    pub min_applications: i64,
    pub min_updates_for_temporal: usize,
    pub min_updates_for_trajectory: usize,
    /// Session-context rows older than this are purged
    pub context_retention_days: i64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            prior_fraud_rate: 0.05,
            threshold_suspicious: 0.20,
            threshold_fraud_likely: 0.50,
            threshold_fraud_confirmed: 0.80,
            success_rate_z_threshold: 2.5,
            temporal_score_threshold: 0.5,
            trajectory_score_threshold: 0.5,
            min_applications: 10,
            min_updates_for_temporal: 5,
            min_updates_for_trajectory: 10,
            context_retention_days: 7,
        }
    }
}

/// Meta-observer knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub z_score_threshold: f64,
    pub trend_window_hours: i64,
    pub baseline_window_hours: i64,
    pub current_window_hours: i64,
    /// Detectors above this false-positive rate surface a warning
    pub fpr_tolerance: f64,
    /// Series younger than this stay in bootstrap mode
    pub bootstrap_days: i64,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: 3.0,
            trend_window_hours: 168,
            baseline_window_hours: 720,
            current_window_hours: 12,
            fpr_tolerance: 0.05,
            bootstrap_days: 7,
        }
    }
}

/// Context-builder knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Default token budget for `build_context`
    pub default_max_tokens: i64,
    /// Golden-rules cache TTL in seconds
    pub golden_rules_cache_secs: u64,
    /// Tier 3 stops once the remaining budget drops below this
    pub tier3_min_remaining_tokens: i64,
    /// Semantic-similarity threshold for `query_semantic`
    pub semantic_threshold: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: 5000,
            golden_rules_cache_secs: 300,
            tier3_min_remaining_tokens: 500,
            semantic_threshold: 0.75,
        }
    }
}

/// Periodic-task intervals, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub fraud_sweep_interval_secs: u64,
    pub baseline_refresh_interval_secs: u64,
    pub context_cleanup_interval_secs: u64,
    pub distillation_interval_secs: u64,
    pub meta_observer_interval_secs: u64,
    /// Heuristics per fraud sweep
    pub fraud_sweep_batch: i64,
    /// A task failing this many consecutive runs disables itself
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fraud_sweep_interval_secs: 3600,
            baseline_refresh_interval_secs: 6 * 3600,
            context_cleanup_interval_secs: 6 * 3600,
            distillation_interval_secs: 3600,
            meta_observer_interval_secs: 3600,
            fraud_sweep_batch: 50,
            max_consecutive_failures: 3,
        }
    }
}
