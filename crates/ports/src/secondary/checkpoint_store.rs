use domain::workflow::entity::{RunRecord, SchedulerCursor};
use domain::workflow::error::CheckpointError;

/// Durable journal behind workflow replay.
///
/// Holds three kinds of entries: run records, per-run step results keyed by
/// `(run_id, step_key)`, and scheduler cursors. Implementations must make
/// each call atomic; a step result that was saved is returned by every
/// later `load_step` for the same key.
pub trait CheckpointStore: Send + Sync {
    /// Insert or replace a run record.
    fn save_run(&self, record: &RunRecord) -> Result<(), CheckpointError>;

    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, CheckpointError>;

    /// Most recent runs first, at most `limit`.
    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, CheckpointError>;

    /// Runs whose status is still `running`.
    fn incomplete_runs(&self) -> Result<Vec<RunRecord>, CheckpointError>;

    fn load_step(&self, run_id: &str, step_key: &str) -> Result<Option<Vec<u8>>, CheckpointError>;

    fn save_step(&self, run_id: &str, step_key: &str, payload: &[u8])
    -> Result<(), CheckpointError>;

    /// Drop every step journaled for `run_id`. Returns the number removed.
    fn clear_steps(&self, run_id: &str) -> Result<usize, CheckpointError>;

    /// Delete finished runs beyond the `keep` most recent, with their
    /// journals. Returns the number of runs removed.
    fn prune_runs(&self, keep: usize) -> Result<usize, CheckpointError>;

    fn load_cursor(&self, scheduler_id: &str) -> Result<Option<SchedulerCursor>, CheckpointError>;

    fn save_cursor(&self, cursor: &SchedulerCursor) -> Result<(), CheckpointError>;
}
