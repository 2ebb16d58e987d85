use std::path::Path;
use std::sync::Arc;

use adapters::memory::cache_store::InMemoryCacheStore;
use adapters::memory::document_store::InMemoryDocumentStore;
use adapters::memory::vector_index::InMemoryVectorIndex;
use adapters::notify::log_sink::LogNotificationSink;
use adapters::notify::webhook_sink::WebhookNotificationSink;
use adapters::storage::redb_cache_store::RedbCacheStore;
use adapters::storage::redb_checkpoint_store::RedbCheckpointStore;
use adapters::storage::redb_database::open_database;
use adapters::storage::redb_document_store::RedbDocumentStore;
use adapters::storage::redb_vector_index::RedbVectorIndex;
use anyhow::Context;
use application::activities::{ActivitySettings, AuditActivities};
use application::audit_service_impl::AuditAppService;
use application::audit_workflow::{AuditWorkflow, StageOptions};
use application::retry::{ActivityOptions, RetryPolicy};
use application::runner::AuditRunner;
use application::worker::ActivityWorker;
use infrastructure::config::{
    AuditConfig, AuditorConfig, NotificationKind, StoreBackend, WorkflowConfig,
};
use infrastructure::constants::DEFAULT_CONFIG_PATH;
use infrastructure::logging::init_logging;
use infrastructure::metrics::AuditorMetrics;
use ports::secondary::cache_store::CacheStore;
use ports::secondary::checkpoint_store::CheckpointStore;
use ports::secondary::document_store::DocumentStore;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::notification_sink::NotificationSink;
use ports::secondary::vector_index::VectorIndex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;

/// Resolve and load the configuration.
///
/// An explicit `--config` must exist. Without one the default path is
/// used when present, otherwise defaults plus environment overrides.
pub fn load_config(cli: &Cli) -> anyhow::Result<AuditorConfig> {
    match cli.config.as_deref() {
        Some(path) => AuditorConfig::load(Path::new(path))
            .with_context(|| format!("failed to load config '{path}'")),
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            AuditorConfig::load(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("failed to load config '{DEFAULT_CONFIG_PATH}'"))
        }
        None => AuditorConfig::from_env().context("invalid MEMORY_AUDIT_* environment override"),
    }
}

/// Install the tracing subscriber. CLI flags take precedence over the
/// config file.
pub fn init_observability(cli: &Cli, config: &AuditorConfig) -> anyhow::Result<()> {
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    info!(
        config_path = cli.config.as_deref().unwrap_or("<defaults>"),
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "memory auditor starting"
    );
    Ok(())
}

/// The three audited stores and the checkpoint journal.
struct Backends {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    vectors: Arc<dyn VectorIndex>,
    checkpoints: Arc<dyn CheckpointStore>,
}

/// Wire adapters, workflow and service from `config`.
///
/// `cancel` is the process shutdown token; every run observes it.
pub fn build_service(
    config: &AuditorConfig,
    cancel: CancellationToken,
) -> anyhow::Result<AuditAppService> {
    // ── 1. Stores and checkpoint journal ────────────────────────────
    let backends = open_backends(config)?;
    info!(
        backend = %config.stores.backend,
        checkpoint_path = %config.workflow.checkpoint_path,
        "stores initialized"
    );

    // ── 2. Notification sink ────────────────────────────────────────
    let notifier: Arc<dyn NotificationSink> = match config.notification.kind {
        NotificationKind::Log => Arc::new(LogNotificationSink),
        NotificationKind::Webhook => {
            let url = config
                .notification
                .webhook_url
                .clone()
                .context("notification.webhook_url is required for webhook notifications")?;
            Arc::new(WebhookNotificationSink::new(
                url,
                std::time::Duration::from_secs(config.notification.timeout_secs),
            )?)
        }
    };
    info!(sink = notifier.name(), "notification sink initialized");

    // ── 3. Metrics ──────────────────────────────────────────────────
    let mut metrics = AuditorMetrics::new();
    if let Some(path) = &config.metrics.textfile_path {
        info!(path = %path, "metrics textfile export enabled");
        metrics = metrics.with_textfile(path);
    }
    let metrics: Arc<dyn MetricsPort> = Arc::new(metrics);

    // ── 4. Activities, workflow and runner ──────────────────────────
    let activities = Arc::new(AuditActivities::new(
        backends.documents,
        backends.cache,
        backends.vectors,
        notifier,
        activity_settings(&config.audit),
    ));
    let workflow = AuditWorkflow::new(
        activities,
        Arc::clone(&backends.checkpoints),
        Arc::clone(&metrics),
        stage_options(&config.workflow),
    );
    let worker = ActivityWorker::new(config.workflow.max_concurrent_activities, metrics);
    let runner = AuditRunner::new(workflow, backends.checkpoints, worker, cancel);
    info!(
        max_concurrent_activities = config.workflow.max_concurrent_activities,
        perform_cleanup = config.audit.perform_cleanup,
        max_deletion_percentage = config.audit.max_deletion_percentage,
        "audit workflow initialized"
    );

    // ── 5. Service ──────────────────────────────────────────────────
    Ok(AuditAppService::new(Arc::new(runner), config.run_config())
        .with_retain_runs(config.workflow.retain_runs))
}

fn open_backends(config: &AuditorConfig) -> anyhow::Result<Backends> {
    let checkpoint_path = Path::new(&config.workflow.checkpoint_path);
    ensure_parent_dir(checkpoint_path)?;

    match config.stores.backend {
        StoreBackend::Memory => Ok(Backends {
            documents: Arc::new(InMemoryDocumentStore::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
            vectors: Arc::new(InMemoryVectorIndex::new()),
            checkpoints: Arc::new(RedbCheckpointStore::open(checkpoint_path)?),
        }),
        StoreBackend::Redb => {
            let stores_path = Path::new(&config.stores.path);
            ensure_parent_dir(stores_path)?;
            let db = open_database(stores_path)
                .with_context(|| format!("failed to open '{}'", stores_path.display()))?;
            // redb allows one handle per file, so a shared file reuses it.
            let checkpoints = if config.stores_share_checkpoint_file() {
                RedbCheckpointStore::new(Arc::clone(&db))?
            } else {
                RedbCheckpointStore::open(checkpoint_path)?
            };
            Ok(Backends {
                documents: Arc::new(RedbDocumentStore::new(Arc::clone(&db))?),
                cache: Arc::new(RedbCacheStore::new(Arc::clone(&db))?),
                vectors: Arc::new(RedbVectorIndex::new(db)?),
                checkpoints: Arc::new(checkpoints),
            })
        }
    }
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn activity_settings(audit: &AuditConfig) -> ActivitySettings {
    ActivitySettings {
        document_collections: audit.collections.clone(),
        embedded_collections: audit.embedded_collections.clone(),
        cache_prefix: audit.cache_prefix.clone(),
        session_namespace: audit.session_namespace.clone(),
        duplicate_scan_limit: audit.duplicate_scan_limit,
        ..ActivitySettings::default()
    }
}

fn stage_options(workflow: &WorkflowConfig) -> StageOptions {
    let retry = &workflow.retry;
    let policy = RetryPolicy {
        maximum_attempts: retry.maximum_attempts,
        initial_interval: retry.initial_interval(),
        backoff_coefficient: retry.backoff_coefficient,
        maximum_interval: retry.maximum_interval(),
        non_retryable_errors: retry.non_retryable_errors.clone(),
    };
    let timeouts = &workflow.timeouts;
    StageOptions {
        inventory: ActivityOptions::new(timeouts.inventory(), policy.clone()),
        detection: ActivityOptions::new(timeouts.detection(), policy.clone()),
        cleanup: ActivityOptions::new(timeouts.cleanup(), policy.clone()),
        report: ActivityOptions::new(timeouts.report(), policy.clone()),
        notify: ActivityOptions::new(timeouts.notify(), policy),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::workflow::entity::RunStatus;

    use super::*;

    fn config_in(dir: &Path, extra: &str) -> AuditorConfig {
        let yaml = format!(
            "workflow:\n  checkpoint_path: {}\n{extra}",
            dir.join("state/checkpoints.redb").display()
        );
        AuditorConfig::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn stage_options_follow_config() {
        let config = AuditorConfig::from_yaml(
            r"
workflow:
  timeouts:
    inventory_secs: 12
    notify_secs: 3
  retry:
    maximum_attempts: 7
    initial_interval_ms: 250
    backoff_coefficient: 1.5
    maximum_interval_ms: 2000
    non_retryable_errors: [validation]
",
        )
        .unwrap();
        let options = stage_options(&config.workflow);
        assert_eq!(options.inventory.start_to_close_timeout, Duration::from_secs(12));
        assert_eq!(options.detection.start_to_close_timeout, Duration::from_secs(600));
        assert_eq!(options.notify.start_to_close_timeout, Duration::from_secs(3));
        let policy = &options.cleanup.retry_policy;
        assert_eq!(policy.maximum_attempts, 7);
        assert_eq!(policy.initial_interval, Duration::from_millis(250));
        assert_eq!(policy.maximum_interval, Duration::from_secs(2));
        assert_eq!(policy.non_retryable_errors, vec!["validation"]);
    }

    #[test]
    fn default_config_matches_default_stage_options() {
        assert_eq!(
            stage_options(&AuditorConfig::default().workflow),
            StageOptions::default()
        );
    }

    #[test]
    fn activity_settings_follow_config() {
        let config = AuditorConfig::from_yaml(
            r#"
audit:
  collections: [memories, notes]
  embedded_collections: [notes]
  cache_prefix: "bot:"
  duplicate_scan_limit: 50
"#,
        )
        .unwrap();
        let settings = activity_settings(&config.audit);
        assert_eq!(settings.document_collections, vec!["memories", "notes"]);
        assert_eq!(settings.embedded_collections, vec!["notes"]);
        assert_eq!(settings.cache_pattern(), "bot:*");
        assert_eq!(settings.duplicate_scan_limit, 50);
        assert_eq!(
            settings.report_collection,
            ActivitySettings::default().report_collection
        );
    }

    #[test]
    fn default_config_matches_default_activity_settings() {
        assert_eq!(
            activity_settings(&AuditorConfig::default().audit),
            ActivitySettings::default()
        );
    }

    #[tokio::test]
    async fn memory_backend_runs_and_persists_run_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "");
        let service = build_service(&config, CancellationToken::new()).unwrap();

        let report = service.run_audit(false).await.unwrap();
        assert!(dir.path().join("state/checkpoints.redb").exists());

        let runs = service.list_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].report_id.as_deref(), Some(report.report_id.as_str()));
    }

    #[tokio::test]
    async fn redb_backend_shares_one_file_with_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/checkpoints.redb");
        let config = config_in(
            dir.path(),
            &format!("stores:\n  backend: redb\n  path: {}\n", path.display()),
        );
        assert!(config.stores_share_checkpoint_file());

        let service = build_service(&config, CancellationToken::new()).unwrap();
        let report = service.run_audit(false).await.unwrap();

        let stored = service.get_report(&report.report_id).await.unwrap();
        assert_eq!(stored.map(|r| r.report_id), Some(report.report_id));
    }

    #[tokio::test]
    async fn redb_backend_with_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let stores = dir.path().join("stores/data.redb");
        let config = config_in(
            dir.path(),
            &format!("stores:\n  backend: redb\n  path: {}\n", stores.display()),
        );

        let service = build_service(&config, CancellationToken::new()).unwrap();
        service.run_audit(false).await.unwrap();
        assert!(stores.exists());
    }

    #[tokio::test]
    async fn metrics_textfile_written_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let prom = dir.path().join("audit.prom");
        let config = config_in(
            dir.path(),
            &format!("metrics:\n  textfile_path: {}\n", prom.display()),
        );

        let service = build_service(&config, CancellationToken::new()).unwrap();
        service.run_audit(false).await.unwrap();

        let body = std::fs::read_to_string(&prom).unwrap();
        assert!(body.contains(r#"audit_runs_total{status="completed"} 1"#));
        assert!(body.contains("audit_health_status 0"));
    }

    #[tokio::test]
    async fn interrupted_manual_run_is_resumed_by_next_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), "");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let service = build_service(&config, cancel).unwrap();
        assert!(service.run_audit(false).await.is_err());
        let interrupted = service.list_runs(1).unwrap().remove(0);
        assert_eq!(interrupted.status, RunStatus::Running);
        drop(service);

        let service = build_service(&config, CancellationToken::new()).unwrap();
        let resumed = service.resume_incomplete().unwrap();
        assert_eq!(resumed, vec![interrupted.run_id.clone()]);
        service.drain().await;

        let record = service.run_status(&interrupted.run_id).unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Completed);
    }
}
