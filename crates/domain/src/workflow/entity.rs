use serde::{Deserialize, Serialize};

use crate::common::entity::NANOS_PER_MILLI;
use crate::report::entity::HealthStatus;
use crate::workflow::error::WorkflowError;

/// Prefix of every audit run id.
pub const RUN_ID_PREFIX: &str = "memory-audit";

/// Per-run settings. Copied into every detector and cleanup activity and
/// persisted with the run record so a resumed run keeps its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRunConfig {
    pub perform_cleanup: bool,
    /// Safety cap for automated deletion, as a percentage of the backend's
    /// inventory total.
    pub max_deletion_percentage: f64,
    pub similarity_threshold: f64,
    /// Records younger than this are never flagged. Absorbs write lag
    /// between the stores.
    pub min_age_secs: u64,
    pub session_ttl_secs: u64,
}

impl Default for AuditRunConfig {
    fn default() -> Self {
        Self {
            perform_cleanup: false,
            max_deletion_percentage: 5.0,
            similarity_threshold: 0.98,
            min_age_secs: 600,
            session_ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl AuditRunConfig {
    #[must_use]
    pub fn with_cleanup(mut self, perform_cleanup: bool) -> Self {
        self.perform_cleanup = perform_cleanup;
        self
    }
}

/// Stage of the audit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Inventorying,
    Detecting,
    Cleaning,
    Reporting,
    Done,
    Failed,
}

impl AuditStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inventorying => "inventorying",
            Self::Detecting => "detecting",
            Self::Cleaning => "cleaning",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal forward transitions. `Failed` is reachable from every
    /// non-terminal stage; cleaning is optional.
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Inventorying, Self::Detecting)
            | (Self::Detecting | Self::Cleaning, Self::Reporting)
            | (Self::Detecting, Self::Cleaning)
            | (Self::Reporting, Self::Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who started a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RunTrigger {
    Manual,
    Scheduled { scheduler_id: String, iteration: u64 },
}

/// Durable metadata of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub stage: AuditStage,
    pub config: AuditRunConfig,
    pub started_at_ns: u64,
    pub updated_at_ns: u64,
    pub finished_at_ns: Option<u64>,
    pub report_id: Option<String>,
    pub health_status: Option<HealthStatus>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        trigger: RunTrigger,
        config: AuditRunConfig,
        started_at_ns: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            trigger,
            status: RunStatus::Running,
            stage: AuditStage::Inventorying,
            config,
            started_at_ns,
            updated_at_ns: started_at_ns,
            finished_at_ns: None,
            report_id: None,
            health_status: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Move to `next`. Re-entering the current stage is a no-op so replayed
    /// runs can walk the stages again.
    pub fn advance(&mut self, next: AuditStage, now_ns: u64) -> Result<(), WorkflowError> {
        if self.stage == next {
            return Ok(());
        }
        if !self.stage.can_advance_to(next) {
            return Err(WorkflowError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.updated_at_ns = now_ns;
        Ok(())
    }

    /// Rewind a resumed, non-terminal run to the first stage. Completed
    /// steps are replayed from the journal, not executed again.
    pub fn rewind_for_replay(&mut self) {
        if !self.is_terminal() {
            self.stage = AuditStage::Inventorying;
        }
    }

    pub fn complete(&mut self, report_id: String, health: HealthStatus, now_ns: u64) {
        self.stage = AuditStage::Done;
        self.status = RunStatus::Completed;
        self.report_id = Some(report_id);
        self.health_status = Some(health);
        self.updated_at_ns = now_ns;
        self.finished_at_ns = Some(now_ns);
    }

    pub fn fail(&mut self, error: String, now_ns: u64) {
        self.stage = AuditStage::Failed;
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.updated_at_ns = now_ns;
        self.finished_at_ns = Some(now_ns);
    }
}

/// Run id for a run started at `started_at_ns`. Millisecond resolution; the
/// caller guarantees uniqueness.
pub fn run_id_for(started_at_ns: u64) -> String {
    format!("{RUN_ID_PREFIX}-{}", started_at_ns / NANOS_PER_MILLI)
}

/// Persisted position of the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCursor {
    pub scheduler_id: String,
    pub iteration: u64,
    pub interval_secs: u64,
    /// Child run of the current iteration, set before the run starts so a
    /// restart resumes it instead of starting another.
    pub current_run_id: Option<String>,
    pub updated_at_ns: u64,
}

impl SchedulerCursor {
    pub fn new(scheduler_id: impl Into<String>, interval_secs: u64, now_ns: u64) -> Self {
        Self {
            scheduler_id: scheduler_id.into(),
            iteration: 0,
            interval_secs,
            current_run_id: None,
            updated_at_ns: now_ns,
        }
    }

    pub fn begin_child(&mut self, run_id: String, now_ns: u64) {
        self.current_run_id = Some(run_id);
        self.updated_at_ns = now_ns;
    }

    pub fn finish_iteration(&mut self, now_ns: u64) {
        self.iteration += 1;
        self.current_run_id = None;
        self.updated_at_ns = now_ns;
    }

    /// Journal key of this iteration's sleep.
    pub fn sleep_step_key(&self) -> String {
        format!("sleep/{}", self.iteration)
    }
}
