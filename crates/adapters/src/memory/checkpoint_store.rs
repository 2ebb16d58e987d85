use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use domain::workflow::entity::{RunRecord, RunStatus, SchedulerCursor};
use domain::workflow::error::CheckpointError;
use ports::secondary::checkpoint_store::CheckpointStore;

#[derive(Default)]
struct State {
    runs: BTreeMap<String, RunRecord>,
    steps: BTreeMap<(String, String), Vec<u8>>,
    cursors: BTreeMap<String, SchedulerCursor>,
}

/// Checkpoint store that lives as long as the process. Nothing survives a
/// restart; use the redb store for durable runs.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    state: Mutex<State>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CheckpointError> {
        self.state
            .lock()
            .map_err(|e| CheckpointError::Storage(format!("lock poisoned: {e}")))
    }

    /// Number of journaled steps for `run_id`.
    pub fn step_count(&self, run_id: &str) -> usize {
        self.lock()
            .map(|s| s.steps.keys().filter(|(run, _)| run == run_id).count())
            .unwrap_or(0)
    }
}

fn newest_first(runs: &mut [RunRecord]) {
    runs.sort_by(|a, b| {
        b.started_at_ns
            .cmp(&a.started_at_ns)
            .then_with(|| b.run_id.cmp(&a.run_id))
    });
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save_run(&self, record: &RunRecord) -> Result<(), CheckpointError> {
        self.lock()?
            .runs
            .insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, CheckpointError> {
        Ok(self.lock()?.runs.get(run_id).cloned())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, CheckpointError> {
        let mut runs: Vec<RunRecord> = self.lock()?.runs.values().cloned().collect();
        newest_first(&mut runs);
        runs.truncate(limit);
        Ok(runs)
    }

    fn incomplete_runs(&self) -> Result<Vec<RunRecord>, CheckpointError> {
        Ok(self
            .lock()?
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect())
    }

    fn load_step(&self, run_id: &str, step_key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        Ok(self
            .lock()?
            .steps
            .get(&(run_id.to_string(), step_key.to_string()))
            .cloned())
    }

    fn save_step(&self, run_id: &str, step_key: &str, payload: &[u8]) -> Result<(), CheckpointError> {
        self.lock()?
            .steps
            .insert((run_id.to_string(), step_key.to_string()), payload.to_vec());
        Ok(())
    }

    fn clear_steps(&self, run_id: &str) -> Result<usize, CheckpointError> {
        let mut state = self.lock()?;
        let before = state.steps.len();
        state.steps.retain(|(run, _), _| run != run_id);
        Ok(before - state.steps.len())
    }

    fn prune_runs(&self, keep: usize) -> Result<usize, CheckpointError> {
        let mut state = self.lock()?;
        let mut runs: Vec<RunRecord> = state.runs.values().cloned().collect();
        newest_first(&mut runs);
        let doomed: Vec<String> = runs
            .into_iter()
            .skip(keep)
            .filter(|r| r.status != RunStatus::Running)
            .map(|r| r.run_id)
            .collect();
        for run_id in &doomed {
            state.runs.remove(run_id);
            state.steps.retain(|(run, _), _| run != run_id);
        }
        Ok(doomed.len())
    }

    fn load_cursor(&self, scheduler_id: &str) -> Result<Option<SchedulerCursor>, CheckpointError> {
        Ok(self.lock()?.cursors.get(scheduler_id).cloned())
    }

    fn save_cursor(&self, cursor: &SchedulerCursor) -> Result<(), CheckpointError> {
        self.lock()?
            .cursors
            .insert(cursor.scheduler_id.clone(), cursor.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::report::entity::HealthStatus;
    use domain::workflow::entity::{AuditRunConfig, RunTrigger};

    fn run(id: &str, started: u64) -> RunRecord {
        RunRecord::new(id, RunTrigger::Manual, AuditRunConfig::default(), started)
    }

    #[test]
    fn steps_roundtrip_and_clear() {
        let store = InMemoryCheckpointStore::new();
        store.save_step("r1", "inventory/document", b"{}").unwrap();
        store.save_step("r1", "inventory/cache", b"{}").unwrap();
        store.save_step("r2", "inventory/cache", b"[]").unwrap();
        assert_eq!(store.load_step("r1", "inventory/cache").unwrap().unwrap(), b"{}");
        assert!(store.load_step("r1", "missing").unwrap().is_none());
        assert_eq!(store.clear_steps("r1").unwrap(), 2);
        assert_eq!(store.step_count("r1"), 0);
        assert_eq!(store.step_count("r2"), 1);
    }

    #[test]
    fn list_runs_newest_first() {
        let store = InMemoryCheckpointStore::new();
        store.save_run(&run("a", 1)).unwrap();
        store.save_run(&run("c", 3)).unwrap();
        store.save_run(&run("b", 2)).unwrap();
        let ids: Vec<_> = store.list_runs(2).unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(store.incomplete_runs().unwrap().len(), 3);
    }

    #[test]
    fn prune_keeps_recent_and_running() {
        let store = InMemoryCheckpointStore::new();
        for i in 0..4_u64 {
            let mut record = run(&format!("r{i}"), i);
            if i != 0 {
                record.complete(format!("audit-{i}"), HealthStatus::Healthy, i + 1);
            }
            store.save_run(&record).unwrap();
            store.save_step(&record.run_id, "report/build", b"{}").unwrap();
        }
        // r3 and r2 kept as most recent; r1 removed; r0 still running.
        assert_eq!(store.prune_runs(2).unwrap(), 1);
        assert!(store.load_run("r1").unwrap().is_none());
        assert!(store.load_run("r0").unwrap().is_some());
        assert_eq!(store.step_count("r1"), 0);
    }

    #[test]
    fn cursor_roundtrip() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load_cursor("sched").unwrap().is_none());
        let cursor = SchedulerCursor::new("sched", 60, 1);
        store.save_cursor(&cursor).unwrap();
        assert_eq!(store.load_cursor("sched").unwrap(), Some(cursor));
    }
}
