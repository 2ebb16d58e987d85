use std::sync::Arc;
use std::time::Duration;

use domain::common::entity::current_timestamp_ns;
use domain::workflow::entity::{AuditRunConfig, RunRecord, RunStatus, RunTrigger, SchedulerCursor};
use domain::workflow::error::{ActivityError, CheckpointError, WorkflowError};
use ports::secondary::checkpoint_store::CheckpointStore;
use tokio_util::sync::CancellationToken;

use crate::durable::WorkflowContext;
use crate::runner::AuditRunner;

/// Default id of the recurring audit.
pub const DEFAULT_SCHEDULER_ID: &str = "scheduled-memory-audit";

const CURSOR_RETRY_INITIAL: Duration = Duration::from_secs(1);
const CURSOR_RETRY_MAX: Duration = Duration::from_secs(60);

/// Recurring audit: start a run, wait out the interval, repeat.
///
/// The loop position lives in a `SchedulerCursor`; the child run id is
/// stored before the child starts and the sleep deadline is journaled, so
/// a restarted scheduler resumes the in-flight child or the remaining
/// sleep instead of starting over. Neither a failing child nor a failing
/// checkpoint write stops the loop: cursor reads and writes are retried,
/// journal housekeeping is skipped until the next iteration.
pub struct SchedulerWorkflow {
    runner: Arc<AuditRunner>,
    scheduler_id: String,
    interval: Duration,
    config: AuditRunConfig,
    retain_runs: usize,
    max_iterations: Option<u64>,
}

impl SchedulerWorkflow {
    pub fn new(
        runner: Arc<AuditRunner>,
        scheduler_id: impl Into<String>,
        interval: Duration,
        config: AuditRunConfig,
        retain_runs: usize,
    ) -> Self {
        Self {
            runner,
            scheduler_id: scheduler_id.into(),
            interval,
            config,
            retain_runs,
            max_iterations: None,
        }
    }

    /// Stop after `iterations` completed iterations, counted across
    /// restarts.
    #[must_use]
    pub fn with_max_iterations(mut self, iterations: Option<u64>) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Loop until cancelled or the iteration limit is reached.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WorkflowError> {
        let checkpoints = Arc::clone(self.runner.checkpoints());
        let interval_secs = self.interval.as_secs();

        let Some(stored) = self
            .retry_checkpoint("load cursor", &cancel, || {
                checkpoints.load_cursor(&self.scheduler_id)
            })
            .await
        else {
            return Ok(());
        };
        let mut cursor = match stored {
            Some(mut cursor) => {
                if cursor.interval_secs != interval_secs {
                    tracing::info!(
                        scheduler_id = %self.scheduler_id,
                        previous_secs = cursor.interval_secs,
                        interval_secs,
                        "schedule interval changed"
                    );
                    cursor.interval_secs = interval_secs;
                }
                tracing::info!(
                    scheduler_id = %self.scheduler_id,
                    iteration = cursor.iteration,
                    "scheduler resumed"
                );
                cursor
            }
            None => SchedulerCursor::new(&self.scheduler_id, interval_secs, current_timestamp_ns()),
        };
        if self.persist_cursor(&cursor, &cancel).await.is_none() {
            return Ok(());
        }
        if let Err(e) = self.abandon_orphans(&cursor) {
            tracing::warn!(scheduler_id = %self.scheduler_id, error = %e, "orphaned scheduled runs not reconciled");
        }

        let ctx = WorkflowContext::new(
            self.scheduler_id.clone(),
            Arc::clone(&checkpoints),
            self.runner.worker().clone(),
            cancel.clone(),
        );

        loop {
            if self.max_iterations.is_some_and(|max| cursor.iteration >= max) {
                tracing::info!(scheduler_id = %self.scheduler_id, iterations = cursor.iteration, "scheduler reached iteration limit");
                return Ok(());
            }
            if cancel.is_cancelled() {
                break;
            }

            match self.run_iteration(&mut cursor, &cancel).await {
                Ok(record) => log_child(&record),
                Err(WorkflowError::Cancelled) => break,
                Err(e) => tracing::error!(
                    scheduler_id = %self.scheduler_id,
                    iteration = cursor.iteration,
                    error = %e,
                    "scheduled audit failed, continuing"
                ),
            }

            let last = self.max_iterations.is_some_and(|max| cursor.iteration + 1 >= max);
            if !last {
                match ctx.sleep(&cursor.sleep_step_key(), self.interval).await {
                    Ok(()) => {}
                    Err(ActivityError::Cancelled) => break,
                    Err(e) => {
                        // Without a durable deadline the timer still has to run.
                        tracing::warn!(scheduler_id = %self.scheduler_id, error = %e, "durable timer unavailable");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(self.interval) => {}
                        }
                    }
                }
            }

            cursor.finish_iteration(current_timestamp_ns());
            if self.persist_cursor(&cursor, &cancel).await.is_none() {
                break;
            }
            self.housekeeping(checkpoints.as_ref());
        }

        tracing::info!(scheduler_id = %self.scheduler_id, iteration = cursor.iteration, "scheduler stopped");
        Ok(())
    }

    async fn run_iteration(
        &self,
        cursor: &mut SchedulerCursor,
        cancel: &CancellationToken,
    ) -> Result<RunRecord, WorkflowError> {
        let checkpoints = self.runner.checkpoints();

        let existing = match cursor.current_run_id.as_deref() {
            Some(run_id) => checkpoints.load_run(run_id)?,
            None => None,
        };
        let record = if let Some(record) = existing {
            record
        } else {
            let record = self.runner.allocate(
                RunTrigger::Scheduled {
                    scheduler_id: self.scheduler_id.clone(),
                    iteration: cursor.iteration,
                },
                self.config.clone(),
            )?;
            cursor.begin_child(record.run_id.clone(), current_timestamp_ns());
            self.persist_cursor(cursor, cancel)
                .await
                .ok_or(WorkflowError::Cancelled)?;
            record
        };

        if record.is_terminal() {
            tracing::info!(run_id = %record.run_id, status = %record.status, "child run already finished");
            return Ok(record);
        }

        let run_id = record.run_id.clone();
        self.runner.execute(record).await?;
        checkpoints
            .load_run(&run_id)?
            .ok_or(WorkflowError::RunNotFound(run_id))
    }

    /// Retry a checkpoint call with capped exponential backoff until it
    /// succeeds. `None` once cancelled.
    async fn retry_checkpoint<T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: impl FnMut() -> Result<T, CheckpointError>,
    ) -> Option<T> {
        let mut delay = CURSOR_RETRY_INITIAL;
        loop {
            match call() {
                Ok(value) => return Some(value),
                Err(e) => tracing::warn!(
                    scheduler_id = %self.scheduler_id,
                    operation,
                    retry_in = ?delay,
                    error = %e,
                    "scheduler checkpoint failed, retrying"
                ),
            }
            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(CURSOR_RETRY_MAX);
        }
    }

    async fn persist_cursor(
        &self,
        cursor: &SchedulerCursor,
        cancel: &CancellationToken,
    ) -> Option<()> {
        let checkpoints = self.runner.checkpoints();
        self.retry_checkpoint("save cursor", cancel, || checkpoints.save_cursor(cursor))
            .await
    }

    /// Drop the finished iteration's journal and old runs. Failures are
    /// logged; the next iteration tries again.
    fn housekeeping(&self, checkpoints: &dyn CheckpointStore) {
        if let Err(e) = checkpoints.clear_steps(&self.scheduler_id) {
            tracing::warn!(scheduler_id = %self.scheduler_id, error = %e, "scheduler journal not cleared");
        }
        match checkpoints.prune_runs(self.retain_runs) {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "old audit runs pruned"),
            Err(e) => tracing::warn!(scheduler_id = %self.scheduler_id, error = %e, "old audit runs not pruned"),
        }
    }

    /// Runs this scheduler allocated but never recorded in its cursor
    /// cannot be resumed; mark them failed.
    fn abandon_orphans(&self, cursor: &SchedulerCursor) -> Result<(), WorkflowError> {
        let checkpoints = self.runner.checkpoints();
        for mut record in checkpoints.incomplete_runs()? {
            let ours = matches!(
                &record.trigger,
                RunTrigger::Scheduled { scheduler_id, .. } if *scheduler_id == self.scheduler_id
            );
            if !ours || cursor.current_run_id.as_deref() == Some(record.run_id.as_str()) {
                continue;
            }
            tracing::warn!(run_id = %record.run_id, "abandoning scheduled run that never started");
            record.fail("abandoned before start".to_string(), current_timestamp_ns());
            checkpoints.save_run(&record)?;
        }
        Ok(())
    }
}

fn log_child(record: &RunRecord) {
    match record.status {
        RunStatus::Completed => tracing::info!(
            run_id = %record.run_id,
            report_id = record.report_id.as_deref().unwrap_or(""),
            health = record.health_status.map_or("unknown", |h| h.as_str()),
            "scheduled audit completed"
        ),
        RunStatus::Failed => tracing::error!(
            run_id = %record.run_id,
            error = record.error.as_deref().unwrap_or(""),
            "scheduled audit failed, continuing"
        ),
        RunStatus::Running => {}
    }
}
