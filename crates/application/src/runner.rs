use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::common::entity::{NANOS_PER_MILLI, current_timestamp_ns};
use domain::report::entity::AuditReport;
use domain::workflow::entity::{AuditRunConfig, RunRecord, RunTrigger, run_id_for};
use domain::workflow::error::WorkflowError;
use ports::secondary::checkpoint_store::CheckpointStore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::audit_workflow::AuditWorkflow;
use crate::durable::WorkflowContext;
use crate::worker::ActivityWorker;

/// Starts and resumes audit runs. Runs never overlap: a second run waits
/// for the first to finish.
pub struct AuditRunner {
    workflow: AuditWorkflow,
    checkpoints: Arc<dyn CheckpointStore>,
    worker: ActivityWorker,
    cancel: CancellationToken,
    run_lock: Mutex<()>,
    last_id_ms: AtomicU64,
}

impl AuditRunner {
    pub fn new(
        workflow: AuditWorkflow,
        checkpoints: Arc<dyn CheckpointStore>,
        worker: ActivityWorker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow,
            checkpoints,
            worker,
            cancel,
            run_lock: Mutex::new(()),
            last_id_ms: AtomicU64::new(0),
        }
    }

    pub fn workflow(&self) -> &AuditWorkflow {
        &self.workflow
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn worker(&self) -> &ActivityWorker {
        &self.worker
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Create and persist a new run record. Run ids have millisecond
    /// resolution; ids already taken, in this process or by a stored run,
    /// move to the next free millisecond.
    pub fn allocate(
        &self,
        trigger: RunTrigger,
        config: AuditRunConfig,
    ) -> Result<RunRecord, WorkflowError> {
        let now_ms = current_timestamp_ns() / NANOS_PER_MILLI;
        let mut candidate = now_ms;
        loop {
            let previous = self
                .last_id_ms
                .fetch_max(candidate, Ordering::SeqCst);
            if previous >= candidate {
                candidate = previous + 1;
                continue;
            }
            let started_at_ns = candidate * NANOS_PER_MILLI;
            if self
                .checkpoints
                .load_run(&run_id_for(started_at_ns))?
                .is_some()
            {
                candidate += 1;
                continue;
            }
            let record = RunRecord::new(run_id_for(started_at_ns), trigger, config, started_at_ns);
            self.checkpoints.save_run(&record)?;
            tracing::info!(run_id = %record.run_id, perform_cleanup = record.config.perform_cleanup, "audit run allocated");
            return Ok(record);
        }
    }

    /// Execute or resume `record` once no other run is active.
    pub async fn execute(&self, record: RunRecord) -> Result<AuditReport, WorkflowError> {
        let _guard = tokio::select! {
            guard = self.run_lock.lock() => guard,
            () = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
        };
        let ctx = WorkflowContext::new(
            record.run_id.clone(),
            Arc::clone(&self.checkpoints),
            self.worker.clone(),
            self.cancel.child_token(),
        );
        self.workflow.run(&ctx, record).await
    }

    /// Resume a stored, non-terminal run.
    pub async fn resume(&self, run_id: &str) -> Result<AuditReport, WorkflowError> {
        let record = self
            .checkpoints
            .load_run(run_id)?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.to_string()))?;
        if record.is_terminal() {
            return Err(WorkflowError::AlreadyFinished(record.run_id));
        }
        tracing::info!(run_id, stage = %record.stage, "resuming audit run");
        self.execute(record).await
    }
}
