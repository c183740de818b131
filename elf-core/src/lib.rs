#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]

//! # ELF Knowledge Core
//!
//! A long-lived service that ingests raw observations of agent behavior and
//! distills them into a layered, queryable knowledge base:
//!
//! - **Heuristics**: actionable rules with EMA-smoothed confidence scores
//! - **Learnings**: labeled events pointing at markdown write-ups
//! - **Patterns**: proto-heuristics extracted from session logs
//! - **Decisions / Invariants**: ADRs and always-true statements
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`service`]: the typed Query API every external driver consumes
//! - [`lifecycle`]: confidence evolution, dormancy, elastic domain capacity
//! - [`observe`]: pattern extraction from session logs
//! - [`distill`]: pattern decay, promotion, golden-rules maintenance
//!
//! ### Detection engines
//! - [`fraud`]: multi-signal anomaly detection with Bayesian fusion
//! - [`meta`]: metric trends, z-score anomalies, alert state machine
//!
//! ### Support modules
//! - [`model`]: entity types shared across the system
//! - [`storage`]: the storage backend abstraction
//! - [`context`]: tiered bounded-token context assembly
//! - [`semantic`]: embedding-backed (or fallback) heuristic ranking
//! - [`validate`]: driver-facing input validation
//! - [`scheduler`]: periodic background tasks
//!
//! ## Quick Start
//!
//! ```no_run
//! use elf_core::config::ElfConfig;
//! use elf_core::service::{CallOptions, ElfService};
//! use elf_core::storage::Store;
//! use std::sync::Arc;
//!
//! async fn example(store: Arc<dyn Store>) -> elf_core::Result<()> {
//!     let config = ElfConfig::default();
//!     let service = ElfService::new(config, store);
//!
//!     let context = service
//!         .build_context("Add authorization checks", Some("auth"), None, 5000, &CallOptions::default())
//!         .await?;
//!     println!("{context}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod distill;
pub mod error;
pub mod fraud;
pub mod lifecycle;
pub mod markdown;
pub mod meta;
pub mod model;
pub mod observe;
pub mod scheduler;
pub mod semantic;
pub mod service;
pub mod stats;
pub mod storage;
pub mod validate;

// Re-export commonly used types
pub use config::ElfConfig;
pub use error::{Error, ErrorCode, Result};
pub use model::{
    ConfidenceUpdate, DomainMetadata, DomainState, FraudClassification, FraudReport, Heuristic,
    HeuristicStatus, Learning, LearningType, MetaAlert, MetricObservation, NewHeuristic,
    NewLearning, Pattern, PatternKind, SourceType, Statistics, UpdateType, ValidationReport,
};
pub use scheduler::Scheduler;
pub use service::{CallOptions, ElfService, LogSource, RecordHeuristicParams};
pub use storage::Store;
