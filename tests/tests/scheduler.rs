//! The background scheduler: periodic tasks fire and shutdown is clean.

use elf_core::config::{ElfConfig, SchedulerConfig};
use elf_core::service::ElfService;
use elf_core::storage::Store;
use elf_core::Scheduler;
use elf_storage::ElfStorage;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn scheduler_runs_tasks_and_shuts_down() {
    let data_root = tempfile::tempdir().unwrap();
    let config = ElfConfig {
        data_root: data_root.path().to_path_buf(),
        scheduler: SchedulerConfig {
            fraud_sweep_interval_secs: 1,
            baseline_refresh_interval_secs: 1,
            context_cleanup_interval_secs: 1,
            distillation_interval_secs: 1,
            meta_observer_interval_secs: 1,
            ..SchedulerConfig::default()
        },
        ..ElfConfig::default()
    };
    std::fs::create_dir_all(config.memory_dir()).unwrap();

    let storage: Arc<dyn Store> =
        Arc::new(ElfStorage::open(&config.db_path()).await.unwrap());
    let service = Arc::new(ElfService::new(config, storage.clone()));

    let scheduler = Scheduler::spawn(service.clone());
    // Give every task at least two full intervals
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown().await;

    // The meta-observer task ran: with no metric history it raises the
    // bootstrap alert and nothing else
    let alerts = storage.list_active_alerts(None).await.unwrap();
    assert!(
        alerts.iter().any(|a| a.alert_type == "bootstrap"),
        "expected a bootstrap alert, got: {:?}",
        alerts.iter().map(|a| a.alert_type.clone()).collect::<Vec<_>>()
    );
}
