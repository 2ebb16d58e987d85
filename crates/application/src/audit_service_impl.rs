use std::sync::Arc;
use std::time::Duration;

use domain::report::entity::AuditReport;
use domain::workflow::entity::{AuditRunConfig, RunRecord, RunTrigger};
use domain::workflow::error::WorkflowError;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::runner::AuditRunner;
use crate::scheduler_workflow::{DEFAULT_SCHEDULER_ID, SchedulerWorkflow};

const SECS_PER_HOUR: u64 = 3600;

/// Application-layer entry point for audits.
///
/// Starts manual runs, drives the recurring schedule, resumes runs left
/// behind by a previous process and answers status queries. Every task it
/// spawns is tracked so `shutdown` can wait for them to park.
pub struct AuditAppService {
    runner: Arc<AuditRunner>,
    defaults: AuditRunConfig,
    scheduler_id: String,
    retain_runs: usize,
    tracker: TaskTracker,
}

/// Handle of a running scheduler.
pub struct ScheduleHandle {
    pub scheduler_id: String,
    task: JoinHandle<Result<(), WorkflowError>>,
}

impl ScheduleHandle {
    /// Wait for the scheduler to stop.
    pub async fn join(self) -> Result<(), WorkflowError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(scheduler_id = %self.scheduler_id, error = %e, "scheduler task aborted");
                Err(WorkflowError::Cancelled)
            }
        }
    }
}

impl AuditAppService {
    pub fn new(runner: Arc<AuditRunner>, defaults: AuditRunConfig) -> Self {
        Self {
            runner,
            defaults,
            scheduler_id: DEFAULT_SCHEDULER_ID.to_string(),
            retain_runs: 100,
            tracker: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn with_scheduler_id(mut self, scheduler_id: impl Into<String>) -> Self {
        self.scheduler_id = scheduler_id.into();
        self
    }

    /// Number of finished runs kept by the scheduler's pruning.
    #[must_use]
    pub fn with_retain_runs(mut self, retain_runs: usize) -> Self {
        self.retain_runs = retain_runs;
        self
    }

    pub fn defaults(&self) -> &AuditRunConfig {
        &self.defaults
    }

    /// Start a manual run in the background and return its run id.
    pub fn start_audit(&self, perform_cleanup: bool) -> Result<String, WorkflowError> {
        let record = self.allocate_manual(perform_cleanup)?;
        let run_id = record.run_id.clone();
        let runner = Arc::clone(&self.runner);
        self.tracker.spawn(async move {
            let run_id = record.run_id.clone();
            if let Err(e) = runner.execute(record).await {
                tracing::warn!(run_id = %run_id, error = %e, "background audit run ended without report");
            }
        });
        Ok(run_id)
    }

    /// Run a manual audit to completion.
    pub async fn run_audit(&self, perform_cleanup: bool) -> Result<AuditReport, WorkflowError> {
        let record = self.allocate_manual(perform_cleanup)?;
        self.runner.execute(record).await
    }

    /// Start the recurring audit with one run every `interval_hours`.
    pub fn start_scheduled_audit(
        &self,
        interval_hours: u64,
        max_iterations: Option<u64>,
    ) -> ScheduleHandle {
        let interval = Duration::from_secs(interval_hours.max(1).saturating_mul(SECS_PER_HOUR));
        let scheduler = SchedulerWorkflow::new(
            Arc::clone(&self.runner),
            self.scheduler_id.clone(),
            interval,
            self.defaults.clone(),
            self.retain_runs,
        )
        .with_max_iterations(max_iterations);
        let cancel = self.runner.cancel_token().child_token();

        tracing::info!(
            scheduler_id = %self.scheduler_id,
            interval_hours = interval_hours.max(1),
            "scheduled audit started"
        );
        let task = self.tracker.spawn(async move { scheduler.run(cancel).await });
        ScheduleHandle {
            scheduler_id: self.scheduler_id.clone(),
            task,
        }
    }

    pub fn run_status(&self, run_id: &str) -> Result<Option<RunRecord>, WorkflowError> {
        Ok(self.runner.checkpoints().load_run(run_id)?)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, WorkflowError> {
        Ok(self.runner.checkpoints().list_runs(limit)?)
    }

    pub async fn get_report(&self, report_id: &str) -> Result<Option<AuditReport>, WorkflowError> {
        self.runner
            .workflow()
            .activities()
            .load_report(report_id)
            .await
            .map_err(WorkflowError::ReportFailed)
    }

    /// Resume manual runs left `running` by a previous process, in the
    /// background. Scheduled runs are resumed by their scheduler.
    pub fn resume_incomplete(&self) -> Result<Vec<String>, WorkflowError> {
        let mut resumed = Vec::new();
        for record in self.runner.checkpoints().incomplete_runs()? {
            if record.trigger != RunTrigger::Manual {
                continue;
            }
            let run_id = record.run_id.clone();
            tracing::info!(run_id = %run_id, stage = %record.stage, "resuming interrupted audit run");
            let runner = Arc::clone(&self.runner);
            self.tracker.spawn(async move {
                let run_id = record.run_id.clone();
                if let Err(e) = runner.execute(record).await {
                    tracing::warn!(run_id = %run_id, error = %e, "resumed audit run ended without report");
                }
            });
            resumed.push(run_id);
        }
        Ok(resumed)
    }

    /// Cancel everything in flight and wait for the tasks to stop. Runs
    /// interrupted here stay resumable.
    pub async fn shutdown(&self) {
        self.runner.cancel_token().cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Wait for background runs without cancelling them.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn allocate_manual(&self, perform_cleanup: bool) -> Result<RunRecord, WorkflowError> {
        self.runner.allocate(
            RunTrigger::Manual,
            self.defaults.clone().with_cleanup(perform_cleanup),
        )
    }
}
