//! # Background scheduler
//!
//! Owns the periodic tasks: fraud sweep, baseline refresh, session-context
//! cleanup, distillation (with capacity enforcement), and the meta-observer
//! rollup/alert check. Two instances of one task never overlap; every task
//! honors the process-wide shutdown signal and abandons its batch within the
//! grace window. A task failing three consecutive runs disables itself and
//! raises a critical meta-alert.

use crate::error::Result;
use crate::model::{AlertSeverity, DomainState};
use crate::service::ElfService;
use crate::storage::Store;
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace window for abandoning a running batch after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// A domain baseline is refreshed once it is older than this
const BASELINE_MAX_AGE_DAYS: i64 = 7;

type TaskFn = Arc<dyn Fn(Arc<ElfService>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct PeriodicTask {
    name: &'static str,
    interval: Duration,
    run: TaskFn,
}

/// Handle over the running background tasks.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn all periodic tasks for a service.
    pub fn spawn(service: Arc<ElfService>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler_config = service.config().scheduler.clone();
        let max_failures = scheduler_config.max_consecutive_failures;

        let tasks: Vec<PeriodicTask> = vec![
            PeriodicTask {
                name: "fraud_sweep",
                interval: Duration::from_secs(scheduler_config.fraud_sweep_interval_secs),
                run: {
                    let batch = scheduler_config.fraud_sweep_batch;
                    Arc::new(move |service: Arc<ElfService>| {
                        Box::pin(async move {
                            service.fraud_detector().sweep(batch).await?;
                            Ok(())
                        })
                    })
                },
            },
            PeriodicTask {
                name: "baseline_refresh",
                interval: Duration::from_secs(scheduler_config.baseline_refresh_interval_secs),
                run: Arc::new(|service: Arc<ElfService>| {
                    Box::pin(async move { refresh_stale_baselines(&service).await })
                }),
            },
            PeriodicTask {
                name: "context_cleanup",
                interval: Duration::from_secs(scheduler_config.context_cleanup_interval_secs),
                run: Arc::new(|service: Arc<ElfService>| {
                    Box::pin(async move {
                        service.fraud_detector().cleanup_contexts().await?;
                        Ok(())
                    })
                }),
            },
            PeriodicTask {
                name: "distillation",
                interval: Duration::from_secs(scheduler_config.distillation_interval_secs),
                run: Arc::new(|service: Arc<ElfService>| {
                    Box::pin(async move { distillation_cycle(&service).await })
                }),
            },
            PeriodicTask {
                name: "meta_observer",
                interval: Duration::from_secs(scheduler_config.meta_observer_interval_secs),
                run: Arc::new(|service: Arc<ElfService>| {
                    Box::pin(async move {
                        service.meta_observer().rollup().await?;
                        service.meta_observer().check_alerts().await?;
                        Ok(())
                    })
                }),
            },
        ];

        let handles = tasks
            .into_iter()
            .map(|task| {
                let service = service.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(task_loop(task, service, shutdown, max_failures))
            })
            .collect();

        info!("Background scheduler started");
        Self { shutdown_tx, handles }
    }

    /// Signal shutdown and wait for every task loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Background scheduler stopped");
    }
}

/// One task's loop: tick, run, track consecutive failures, self-disable at
/// the threshold. Each task has exactly one sequential loop, and a slow run
/// outlasting its interval makes the missed tick skip, so two instances of
/// the same task never overlap.
async fn task_loop(
    task: PeriodicTask,
    service: Arc<ElfService>,
    mut shutdown: watch::Receiver<bool>,
    max_failures: u32,
) {
    let mut interval = tokio::time::interval(task.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Consume the immediate first tick; tasks run after one full interval
    interval.tick().await;

    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        let run = (task.run)(service.clone());
        let outcome = tokio::select! {
            outcome = run => Some(outcome),
            () = shutdown_grace(&mut shutdown) => None,
        };

        match outcome {
            None => {
                warn!(task = task.name, "Abandoning batch on shutdown");
                break;
            }
            Some(Ok(())) => {
                consecutive_failures = 0;
                debug!(task = task.name, "Periodic task run complete");
            }
            Some(Err(e)) => {
                consecutive_failures += 1;
                error!(task = task.name, error = %e, consecutive_failures, "Periodic task failed");
                let metric = format!("task.{}.failures", task.name);
                if let Err(metric_err) =
                    service.meta_observer().record_metric(&metric, 1.0, None, None).await
                {
                    warn!(error = %metric_err, "Failed to record task failure metric");
                }

                if consecutive_failures >= max_failures {
                    error!(task = task.name, "Disabling task after repeated failures");
                    let _ = service
                        .meta_observer()
                        .create_alert(
                            "task_disabled",
                            AlertSeverity::Critical,
                            Some(&metric),
                            Some(f64::from(consecutive_failures)),
                            None,
                            &format!(
                                "Background task '{}' disabled after {consecutive_failures} consecutive failures",
                                task.name
                            ),
                            None,
                        )
                        .await;
                    break;
                }
            }
        }
    }
}

/// Resolves once shutdown is signaled and the grace window has elapsed.
async fn shutdown_grace(shutdown: &mut watch::Receiver<bool>) {
    if !*shutdown.borrow() {
        let _ = shutdown.changed().await;
    }
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

/// Recompute baselines for domains whose current baseline is missing or
/// older than the staleness window.
async fn refresh_stale_baselines(service: &ElfService) -> Result<()> {
    let cutoff = Utc::now() - ChronoDuration::days(BASELINE_MAX_AGE_DAYS);
    for meta in service.store().list_domain_metadata().await? {
        let stale = match service.store().get_domain_baseline(&meta.domain).await? {
            Some(baseline) => baseline.last_updated < cutoff,
            None => true,
        };
        if stale {
            service.fraud_detector().update_baseline(&meta.domain).await?;
        }
    }
    Ok(())
}

/// Periodic distillation: decay + promotion, then capacity enforcement and
/// health refresh for domains over their soft cap.
async fn distillation_cycle(service: &ElfService) -> Result<()> {
    service.distiller().run(None, true, false).await?;

    let now = Utc::now();
    for meta in service.store().list_domain_metadata().await? {
        if meta.state != DomainState::Normal {
            service.lifecycle().enforce_capacity(&meta.domain, now).await?;
        }
        service.lifecycle().refresh_domain_health(&meta.domain).await?;
    }
    Ok(())
}
