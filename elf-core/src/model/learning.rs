use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningType {
    Failure,
    Success,
    Heuristic,
    Experiment,
    Observation,
}

impl LearningType {
    pub fn as_str(self) -> &'static str {
        match self {
            LearningType::Failure => "failure",
            LearningType::Success => "success",
            LearningType::Heuristic => "heuristic",
            LearningType::Experiment => "experiment",
            LearningType::Observation => "observation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "failure" => Some(LearningType::Failure),
            "success" => Some(LearningType::Success),
            "heuristic" => Some(LearningType::Heuristic),
            "experiment" => Some(LearningType::Experiment),
            "observation" => Some(LearningType::Observation),
            _ => None,
        }
    }
}

/// A recorded event pointing at its markdown write-up.
///
/// Learnings are created by drivers and observers, never mutated except for
/// `summary`/`tags`, and never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: i64,
    pub learning_type: LearningType,
    /// Unique path to the sibling markdown file with the full write-up
    pub filepath: String,
    pub title: String,
    pub summary: Option<String>,
    /// Comma-separated token list, no structured JSON
    pub tags: Option<String>,
    pub domain: Option<String>,
    /// Severity in `[1, 5]`
    pub severity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Learning {
    /// Split the stored comma-separated tag column into trimmed tokens.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Parameters for inserting a learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLearning {
    pub learning_type: LearningType,
    pub filepath: String,
    pub title: String,
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub domain: Option<String>,
    pub severity: i64,
}
