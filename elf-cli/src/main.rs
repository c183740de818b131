//! Command-line driver for the knowledge core.
//!
//! One operation per invocation, selected by an action flag. Exit codes:
//! 0 success, 1 validation error, 2 database error, 3 timeout.

mod output;

use clap::{ArgGroup, Parser};
use elf_core::config::ElfConfig;
use elf_core::model::LearningType;
use elf_core::service::{CallOptions, ElfService};
use elf_core::{Error, ErrorCode};
use elf_storage::ElfStorage;
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "elf")]
#[command(about = "Query interface for the emergent-learning knowledge core")]
#[command(version, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["context", "domain", "tags", "recent", "experiments",
               "ceo_reviews", "golden_rules", "stats", "validate"]),
))]
struct Cli {
    /// Build a context packet for a task description
    #[arg(long, value_name = "TASK")]
    context: Option<String>,

    /// Query heuristics and learnings for a domain
    #[arg(long, value_name = "DOMAIN")]
    domain: Option<String>,

    /// Query learnings matching comma-separated tags
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Show the N most recent learnings
    #[arg(long, value_name = "N")]
    recent: Option<i64>,

    /// Filter --recent by learning type
    #[arg(long = "type", value_name = "TYPE")]
    type_filter: Option<String>,

    /// List active experiments
    #[arg(long)]
    experiments: bool,

    /// List pending CEO reviews
    #[arg(long)]
    ceo_reviews: bool,

    /// Print the golden rules
    #[arg(long)]
    golden_rules: bool,

    /// Knowledge-base statistics
    #[arg(long)]
    stats: bool,

    /// Validate database integrity and invariants
    #[arg(long)]
    validate: bool,

    /// Maximum results to return
    #[arg(long, default_value_t = 10)]
    limit: i64,

    /// Token budget for --context
    #[arg(long, default_value_t = 5000)]
    max_tokens: i64,

    /// Query timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Override the data root (default: ~/.claude/emergent-learning)
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Current location for project-scoped heuristics
    #[arg(long, value_name = "DIR")]
    location: Option<PathBuf>,
}

fn exit_code_for(e: &Error) -> ExitCode {
    match e.code() {
        ErrorCode::QS001 => ExitCode::from(1),
        ErrorCode::QS002 => ExitCode::from(2),
        ErrorCode::QS003 => ExitCode::from(3),
        ErrorCode::QS000 | ErrorCode::QS004 => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    match run(cli).await {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(RunError::Core(e)) => {
            eprintln!("error [{}]: {e}", e.code());
            exit_code_for(&e)
        }
        Err(RunError::Other(e)) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

enum RunError {
    Core(Error),
    Other(anyhow::Error),
}

impl From<Error> for RunError {
    fn from(e: Error) -> Self {
        RunError::Core(e)
    }
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        RunError::Other(e)
    }
}

async fn run(cli: Cli) -> Result<String, RunError> {
    let config = ElfConfig::load(cli.data_root.as_deref(), cli.location.as_deref())?;
    let storage = Arc::new(ElfStorage::open(&config.db_path()).await?);
    let mut service = ElfService::new(config, storage);
    service.set_current_location(
        cli.location.as_ref().map(|p| p.to_string_lossy().into_owned()),
    );

    let options = CallOptions {
        timeout: Some(Duration::from_secs(cli.timeout)),
        ..CallOptions::default()
    };

    let value = if let Some(task) = &cli.context {
        let tags = cli.tags.clone().unwrap_or_default();
        let packet = service
            .build_context(
                task,
                cli.domain.as_deref(),
                (!tags.is_empty()).then_some(tags.as_slice()),
                cli.max_tokens,
                &options,
            )
            .await?;
        // Context packets are markdown; print them as-is in text mode
        if cli.format == OutputFormat::Text {
            return Ok(packet);
        }
        serde_json::json!({ "context": packet })
    } else if let Some(domain) = &cli.domain {
        let result = service.query_by_domain(domain, cli.limit, &options).await?;
        serde_json::to_value(result).map_err(|e| RunError::Other(e.into()))?
    } else if let Some(tags) = &cli.tags {
        let learnings = service.query_by_tags(tags, cli.limit, &options).await?;
        serde_json::to_value(learnings).map_err(|e| RunError::Other(e.into()))?
    } else if let Some(limit) = cli.recent {
        let type_filter = match cli.type_filter.as_deref() {
            Some(raw) => Some(LearningType::parse(raw).ok_or_else(|| {
                Error::Validation(format!("Unknown learning type: {raw}"))
            })?),
            None => None,
        };
        let learnings = service.query_recent(type_filter, limit, &options).await?;
        serde_json::to_value(learnings).map_err(|e| RunError::Other(e.into()))?
    } else if cli.experiments {
        let experiments = service.get_active_experiments(&options).await?;
        serde_json::to_value(experiments).map_err(|e| RunError::Other(e.into()))?
    } else if cli.ceo_reviews {
        let reviews = service.get_pending_ceo_reviews(&options).await?;
        serde_json::to_value(reviews).map_err(|e| RunError::Other(e.into()))?
    } else if cli.golden_rules {
        let rules = service.get_golden_rules(None, &options).await?;
        if cli.format == OutputFormat::Text {
            return Ok(rules);
        }
        serde_json::json!({ "golden_rules": rules })
    } else if cli.stats {
        let stats = service.get_statistics(&options).await?;
        serde_json::to_value(stats).map_err(|e| RunError::Other(e.into()))?
    } else if cli.validate {
        let report = service.validate_database(&options).await?;
        serde_json::to_value(report).map_err(|e| RunError::Other(e.into()))?
    } else {
        // clap's ArgGroup guarantees one action was chosen
        return Err(RunError::Other(anyhow::anyhow!("no action selected")));
    };

    output::render(&value, cli.format).map_err(RunError::Other)
}
