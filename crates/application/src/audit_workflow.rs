//! The audit state machine:
//! `inventorying -> detecting -> (cleaning) -> reporting -> done`, with
//! `failed` reachable from every stage.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use domain::cleanup::entity::CleanupResult;
use domain::cleanup::safety::check_safety_cap;
use domain::common::entity::{Backend, current_timestamp_ns};
use domain::detection::entity::{Inconsistency, InconsistencyKind, normalize, subjects_of};
use domain::inventory::entity::{Inventories, StoreInventory};
use domain::report::engine::{ReportContext, report_id_for};
use domain::report::entity::AuditReport;
use domain::workflow::entity::{AuditRunConfig, AuditStage, RunRecord};
use domain::workflow::error::{ActivityError, WorkflowError};
use ports::secondary::checkpoint_store::CheckpointStore;
use ports::secondary::metrics_port::MetricsPort;
use tracing::Instrument;

use crate::activities::AuditActivities;
use crate::durable::WorkflowContext;
use crate::retry::{ActivityOptions, RetryPolicy};

pub const STEP_REPORT_BUILD: &str = "report/build";
pub const STEP_REPORT_STORE: &str = "report/store";
pub const STEP_REPORT_NOTIFY: &str = "report/notify";

pub fn inventory_step(backend: Backend) -> String {
    format!("inventory/{backend}")
}

pub fn detect_step(kind: InconsistencyKind) -> String {
    format!("detect/{kind}")
}

pub fn cleanup_step(kind: InconsistencyKind) -> String {
    format!("cleanup/{kind}")
}

/// Activity options per stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOptions {
    pub inventory: ActivityOptions,
    pub detection: ActivityOptions,
    pub cleanup: ActivityOptions,
    pub report: ActivityOptions,
    pub notify: ActivityOptions,
}

impl Default for StageOptions {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            inventory: ActivityOptions::new(Duration::from_secs(300), policy.clone()),
            detection: ActivityOptions::new(Duration::from_secs(600), policy.clone()),
            cleanup: ActivityOptions::new(Duration::from_secs(600), policy.clone()),
            report: ActivityOptions::new(Duration::from_secs(300), policy.clone()),
            notify: ActivityOptions::new(Duration::from_secs(30), policy),
        }
    }
}

/// One audit run over the three stores.
pub struct AuditWorkflow {
    activities: Arc<AuditActivities>,
    checkpoints: Arc<dyn CheckpointStore>,
    metrics: Arc<dyn MetricsPort>,
    options: StageOptions,
}

impl AuditWorkflow {
    pub fn new(
        activities: Arc<AuditActivities>,
        checkpoints: Arc<dyn CheckpointStore>,
        metrics: Arc<dyn MetricsPort>,
        options: StageOptions,
    ) -> Self {
        Self {
            activities,
            checkpoints,
            metrics,
            options,
        }
    }

    pub fn activities(&self) -> &Arc<AuditActivities> {
        &self.activities
    }

    /// Drive `record` to a terminal state and persist every transition.
    ///
    /// A resumed record replays its journaled steps. On cancellation the
    /// record stays `running` so the run can be resumed later.
    pub async fn run(
        &self,
        ctx: &WorkflowContext,
        mut record: RunRecord,
    ) -> Result<AuditReport, WorkflowError> {
        record.rewind_for_replay();
        record.updated_at_ns = current_timestamp_ns();
        self.checkpoints.save_run(&record)?;

        let span = tracing::info_span!("audit_run", run_id = %record.run_id);
        let outcome = self.drive(ctx, &mut record).instrument(span).await;

        match outcome {
            Ok(report) => {
                record.complete(
                    report.report_id.clone(),
                    report.health_status,
                    current_timestamp_ns(),
                );
                self.checkpoints.save_run(&record)?;
                self.record_outcome(&report);
                tracing::info!(
                    run_id = %record.run_id,
                    report_id = %report.report_id,
                    health = report.health_status.as_str(),
                    inconsistencies = report.total_inconsistencies(),
                    "audit run completed"
                );
                Ok(report)
            }
            Err(WorkflowError::Cancelled) => {
                tracing::info!(run_id = %record.run_id, stage = %record.stage, "audit run interrupted, left resumable");
                Err(WorkflowError::Cancelled)
            }
            Err(e) => {
                record.fail(e.to_string(), current_timestamp_ns());
                if let Err(save_err) = self.checkpoints.save_run(&record) {
                    tracing::error!(run_id = %record.run_id, error = %save_err, "failed to persist failed run");
                }
                self.metrics.record_run("failed");
                tracing::error!(run_id = %record.run_id, error = %e, "audit run failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &WorkflowContext,
        record: &mut RunRecord,
    ) -> Result<AuditReport, WorkflowError> {
        let config = record.config.clone();

        let inventories = Arc::new(self.inventory_stage(ctx).await?);
        self.transition(record, AuditStage::Detecting)?;

        let inconsistencies = self.detection_stage(ctx, &inventories, &config).await?;

        let cleanup_results = if config.perform_cleanup {
            self.transition(record, AuditStage::Cleaning)?;
            Some(
                self.cleanup_stage(ctx, &inventories, &inconsistencies, &config)
                    .await?,
            )
        } else {
            None
        };

        self.transition(record, AuditStage::Reporting)?;
        let context = ReportContext {
            report_id: report_id_for(record.started_at_ns),
            run_id: record.run_id.clone(),
            perform_cleanup: config.perform_cleanup,
        };
        self.report_stage(ctx, context, inventories, inconsistencies, cleanup_results)
            .await
    }

    fn transition(&self, record: &mut RunRecord, next: AuditStage) -> Result<(), WorkflowError> {
        record.advance(next, current_timestamp_ns())?;
        self.checkpoints.save_run(record)?;
        tracing::info!(run_id = %record.run_id, stage = %next, "audit stage entered");
        Ok(())
    }

    /// Bind an activity to this workflow's activities and per-call
    /// arguments. Each call builds a fresh attempt.
    fn bind<A, F, Fut>(&self, args: A, f: F) -> impl Fn() -> Fut + use<A, F, Fut>
    where
        A: Clone,
        F: Fn(Arc<AuditActivities>, A) -> Fut,
    {
        let activities = Arc::clone(&self.activities);
        move || f(Arc::clone(&activities), args.clone())
    }

    async fn inventory_stage(&self, ctx: &WorkflowContext) -> Result<Inventories, WorkflowError> {
        let options = &self.options.inventory;
        let document_key = inventory_step(Backend::Document);
        let cache_key = inventory_step(Backend::Cache);
        let vector_key = inventory_step(Backend::Vector);

        let (document, cache, vector) = tokio::join!(
            ctx.execute_activity(
                &document_key,
                options,
                self.bind((), |a, ()| async move { a.count_document_records().await }),
            ),
            ctx.execute_activity(
                &cache_key,
                options,
                self.bind((), |a, ()| async move { a.count_cache_keys().await }),
            ),
            ctx.execute_activity(
                &vector_key,
                options,
                self.bind((), |a, ()| async move { a.count_vector_embeddings().await }),
            ),
        );

        let mut failures = Vec::new();
        let unavailable = |backend| {
            move |source| WorkflowError::InventoryUnavailable { backend, source }
        };
        let document: Option<StoreInventory> =
            settle(document, &mut failures, unavailable(Backend::Document));
        let cache = settle(cache, &mut failures, unavailable(Backend::Cache));
        let vector = settle(vector, &mut failures, unavailable(Backend::Vector));

        if let (Some(document), Some(cache), Some(vector)) = (document, cache, vector) {
            tracing::info!(
                documents = document.total_count,
                cache_keys = cache.total_count,
                vectors = vector.total_count,
                "inventory joined"
            );
            return Ok(Inventories {
                document,
                cache,
                vector,
            });
        }
        for failure in &failures {
            tracing::error!(run_id = ctx.workflow_id(), error = %failure, "inventory activity failed");
        }
        Err(first_failure(failures))
    }

    async fn detection_stage(
        &self,
        ctx: &WorkflowContext,
        inventories: &Arc<Inventories>,
        config: &AuditRunConfig,
    ) -> Result<Vec<Inconsistency>, WorkflowError> {
        let options = &self.options.detection;
        let orphaned_key = detect_step(InconsistencyKind::OrphanedVector);
        let missing_key = detect_step(InconsistencyKind::MissingEmbedding);
        let expired_key = detect_step(InconsistencyKind::ExpiredSession);
        let duplicate_key = detect_step(InconsistencyKind::DuplicateVector);
        let args = (Arc::clone(inventories), config.clone());

        let (orphaned, missing, expired, duplicates) = tokio::join!(
            ctx.execute_activity(
                &orphaned_key,
                options,
                self.bind(args.clone(), |a, (inv, cfg)| async move {
                    a.detect_orphaned_vectors(&inv, &cfg).await
                }),
            ),
            ctx.execute_activity(
                &missing_key,
                options,
                self.bind(args.clone(), |a, (inv, cfg)| async move {
                    a.detect_missing_embeddings(&inv, &cfg).await
                }),
            ),
            ctx.execute_activity(
                &expired_key,
                options,
                self.bind(config.clone(), |a, cfg| async move {
                    a.detect_expired_sessions(&cfg).await
                }),
            ),
            ctx.execute_activity(
                &duplicate_key,
                options,
                self.bind(args.clone(), |a, (inv, cfg)| async move {
                    a.detect_duplicate_vectors(&inv, &cfg).await
                }),
            ),
        );

        let mut failures = Vec::new();
        let failed = |kind| move |source| WorkflowError::DetectionFailed { kind, source };
        let found: Vec<Option<Vec<Inconsistency>>> = vec![
            settle(orphaned, &mut failures, failed(InconsistencyKind::OrphanedVector)),
            settle(missing, &mut failures, failed(InconsistencyKind::MissingEmbedding)),
            settle(expired, &mut failures, failed(InconsistencyKind::ExpiredSession)),
            settle(duplicates, &mut failures, failed(InconsistencyKind::DuplicateVector)),
        ];
        if !failures.is_empty() {
            for failure in &failures {
                tracing::error!(run_id = ctx.workflow_id(), error = %failure, "detector failed");
            }
            return Err(first_failure(failures));
        }

        let mut inconsistencies: Vec<Inconsistency> = found.into_iter().flatten().flatten().collect();
        normalize(&mut inconsistencies);
        tracing::info!(found = inconsistencies.len(), "detection joined");
        Ok(inconsistencies)
    }

    async fn cleanup_stage(
        &self,
        ctx: &WorkflowContext,
        inventories: &Inventories,
        inconsistencies: &[Inconsistency],
        config: &AuditRunConfig,
    ) -> Result<BTreeMap<InconsistencyKind, CleanupResult>, WorkflowError> {
        let mut results = BTreeMap::new();

        for kind in InconsistencyKind::CLEANABLE {
            let ids = subjects_of(inconsistencies, kind);
            if ids.is_empty() {
                continue;
            }

            let total = inventories.population_of(kind);
            let decision = check_safety_cap(ids.len() as u64, total, config.max_deletion_percentage);
            if let Some(note) = decision.note() {
                tracing::warn!(
                    run_id = ctx.workflow_id(),
                    kind = %kind,
                    affected = ids.len(),
                    total,
                    max_percentage = config.max_deletion_percentage,
                    "cleanup withheld by safety cap"
                );
                results.insert(kind, CleanupResult::skipped(kind, note));
                continue;
            }

            let targets = Arc::new(ids);
            let outcome = ctx
                .execute_activity(
                    &cleanup_step(kind),
                    &self.options.cleanup,
                    self.bind(Arc::clone(&targets), move |a, ids| async move {
                        a.cleanup(kind, &ids).await
                    }),
                )
                .await;

            let result = match outcome {
                Ok(result) => result,
                Err(ActivityError::Cancelled) => return Err(WorkflowError::Cancelled),
                Err(e) => {
                    tracing::error!(
                        run_id = ctx.workflow_id(),
                        kind = %kind,
                        error = %e,
                        "cleanup executor exhausted its retries"
                    );
                    CleanupResult::exhausted(kind, &targets, format!("cleanup failed: {e}"))
                }
            };
            self.metrics
                .record_cleanup_deleted(kind.as_str(), result.succeeded_count);
            results.insert(kind, result);
        }

        Ok(results)
    }

    async fn report_stage(
        &self,
        ctx: &WorkflowContext,
        context: ReportContext,
        inventories: Arc<Inventories>,
        inconsistencies: Vec<Inconsistency>,
        cleanup_results: Option<BTreeMap<InconsistencyKind, CleanupResult>>,
    ) -> Result<AuditReport, WorkflowError> {
        let options = &self.options.report;
        let inputs = (
            context,
            inventories,
            Arc::new(inconsistencies),
            Arc::new(cleanup_results),
        );

        let report: AuditReport = ctx
            .execute_activity(
                STEP_REPORT_BUILD,
                options,
                self.bind(inputs, |a, (context, inventories, found, cleanup)| async move {
                    Ok(a.generate_reconciliation_report(
                        &context,
                        &inventories,
                        &found,
                        (*cleanup).as_ref(),
                    ))
                }),
            )
            .await
            .map_err(report_failure)?;

        ctx.execute_activity(
            STEP_REPORT_STORE,
            options,
            self.bind(Arc::new(report.clone()), |a, report| async move {
                a.store_audit_report(&report).await
            }),
        )
        .await
        .map_err(report_failure)?;

        let notified = ctx
            .execute_activity(
                STEP_REPORT_NOTIFY,
                &self.options.notify,
                self.bind(report.summary_text(), |a, summary| async move {
                    a.notify(&summary).await
                }),
            )
            .await;
        match notified {
            Ok(()) => {}
            Err(ActivityError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    run_id = ctx.workflow_id(),
                    report_id = %report.report_id,
                    error = %e,
                    "audit notification failed, report kept"
                );
            }
        }

        Ok(report)
    }

    /// The run counter goes last: exporters flush on it.
    fn record_outcome(&self, report: &AuditReport) {
        for (kind, count) in &report.summary {
            self.metrics.set_inconsistencies(kind.as_str(), *count);
        }
        self.metrics
            .set_health_status(report.health_status.gauge_value());
        self.metrics.record_run("completed");
    }
}

/// Keep a successful value or remember the failure. Cancellation is kept
/// apart so it wins over ordinary failures.
fn settle<T>(
    result: Result<T, ActivityError>,
    failures: &mut Vec<WorkflowError>,
    wrap: impl FnOnce(ActivityError) -> WorkflowError,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ActivityError::Cancelled) => {
            failures.push(WorkflowError::Cancelled);
            None
        }
        Err(e) => {
            failures.push(wrap(e));
            None
        }
    }
}

fn first_failure(failures: Vec<WorkflowError>) -> WorkflowError {
    if failures.contains(&WorkflowError::Cancelled) {
        return WorkflowError::Cancelled;
    }
    failures
        .into_iter()
        .next()
        .unwrap_or(WorkflowError::Cancelled)
}

fn report_failure(err: ActivityError) -> WorkflowError {
    match err {
        ActivityError::Cancelled => WorkflowError::Cancelled,
        other => WorkflowError::ReportFailed(other),
    }
}
