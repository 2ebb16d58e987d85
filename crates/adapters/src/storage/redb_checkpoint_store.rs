use std::path::Path;
use std::sync::Arc;

use domain::workflow::entity::{RunRecord, RunStatus, SchedulerCursor};
use domain::workflow::error::CheckpointError;
use ports::secondary::checkpoint_store::CheckpointStore;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// redb table: key = run id, value = JSON-serialized `RunRecord`.
const RUNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_runs");

/// redb table: key = `(run_id, step_key)`, value = journaled step result.
const STEPS_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("workflow_steps");

/// redb table: key = scheduler id, value = JSON-serialized `SchedulerCursor`.
const CURSORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("scheduler_cursors");

fn storage<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> CheckpointError {
    move |e| CheckpointError::Storage(format!("{context}: {e}"))
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, CheckpointError> {
    serde_json::to_vec(value).map_err(|e| CheckpointError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CheckpointError> {
    serde_json::from_slice(bytes).map_err(|e| CheckpointError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Durable workflow journal backed by redb.
///
/// Every method runs in its own redb transaction, so a crash leaves either
/// the old or the new entry, never a partial one.
pub struct RedbCheckpointStore {
    db: Arc<Database>,
}

impl RedbCheckpointStore {
    /// Open (or create) a redb database at `path`.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        let db = Database::create(path).map_err(storage("redb open failed"))?;
        Self::new(Arc::new(db))
    }

    /// Use an already open database, e.g. the one shared with the store
    /// adapters.
    pub fn new(db: Arc<Database>) -> Result<Self, CheckpointError> {
        let txn = db.begin_write().map_err(storage("redb txn begin"))?;
        {
            let _runs = txn.open_table(RUNS_TABLE).map_err(storage("redb table create"))?;
            let _steps = txn.open_table(STEPS_TABLE).map_err(storage("redb table create"))?;
            let _cursors = txn
                .open_table(CURSORS_TABLE)
                .map_err(storage("redb table create"))?;
        }
        txn.commit().map_err(storage("redb commit"))?;
        Ok(Self { db })
    }

    fn all_runs(&self) -> Result<Vec<RunRecord>, CheckpointError> {
        let txn = self.db.begin_read().map_err(storage("redb read txn"))?;
        let table = txn.open_table(RUNS_TABLE).map_err(storage("redb read table"))?;
        let mut runs = Vec::new();
        for item in table.iter().map_err(storage("redb iter"))? {
            let (key, value) = item.map_err(storage("redb iter entry"))?;
            runs.push(decode::<RunRecord>(key.value(), value.value())?);
        }
        runs.sort_by(|a, b| {
            b.started_at_ns
                .cmp(&a.started_at_ns)
                .then_with(|| b.run_id.cmp(&a.run_id))
        });
        Ok(runs)
    }

    fn put(&self, table: TableDefinition<'static, &'static str, &'static [u8]>, key: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        let txn = self.db.begin_write().map_err(storage("redb write txn"))?;
        {
            let mut table = txn.open_table(table).map_err(storage("redb write table"))?;
            table.insert(key, bytes).map_err(storage("redb insert"))?;
        }
        txn.commit().map_err(storage("redb write commit"))
    }

    fn get(&self, table: TableDefinition<'static, &'static str, &'static [u8]>, key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let txn = self.db.begin_read().map_err(storage("redb read txn"))?;
        let table = txn.open_table(table).map_err(storage("redb read table"))?;
        Ok(table
            .get(key)
            .map_err(storage("redb get"))?
            .map(|guard| guard.value().to_vec()))
    }

    fn step_keys(
        table: &redb::Table<'_, (&'static str, &'static str), &'static [u8]>,
        run_id: &str,
    ) -> Result<Vec<String>, CheckpointError> {
        let mut keys = Vec::new();
        for item in table.range((run_id, "")..).map_err(storage("redb range"))? {
            let (key, _) = item.map_err(storage("redb range entry"))?;
            let (run, step) = key.value();
            if run != run_id {
                break;
            }
            keys.push(step.to_string());
        }
        Ok(keys)
    }
}

impl CheckpointStore for RedbCheckpointStore {
    fn save_run(&self, record: &RunRecord) -> Result<(), CheckpointError> {
        let bytes = encode(&record.run_id, record)?;
        self.put(RUNS_TABLE, &record.run_id, &bytes)
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, CheckpointError> {
        self.get(RUNS_TABLE, run_id)?
            .map(|bytes| decode(run_id, &bytes))
            .transpose()
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, CheckpointError> {
        let mut runs = self.all_runs()?;
        runs.truncate(limit);
        Ok(runs)
    }

    fn incomplete_runs(&self) -> Result<Vec<RunRecord>, CheckpointError> {
        Ok(self
            .all_runs()?
            .into_iter()
            .filter(|r| r.status == RunStatus::Running)
            .collect())
    }

    fn load_step(&self, run_id: &str, step_key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let txn = self.db.begin_read().map_err(storage("redb read txn"))?;
        let table = txn.open_table(STEPS_TABLE).map_err(storage("redb read table"))?;
        Ok(table
            .get((run_id, step_key))
            .map_err(storage("redb get"))?
            .map(|guard| guard.value().to_vec()))
    }

    fn save_step(&self, run_id: &str, step_key: &str, payload: &[u8]) -> Result<(), CheckpointError> {
        let txn = self.db.begin_write().map_err(storage("redb write txn"))?;
        {
            let mut table = txn.open_table(STEPS_TABLE).map_err(storage("redb write table"))?;
            table
                .insert((run_id, step_key), payload)
                .map_err(storage("redb insert"))?;
        }
        txn.commit().map_err(storage("redb write commit"))
    }

    fn clear_steps(&self, run_id: &str) -> Result<usize, CheckpointError> {
        let txn = self.db.begin_write().map_err(storage("redb clear txn"))?;
        let removed = {
            let mut table = txn.open_table(STEPS_TABLE).map_err(storage("redb clear table"))?;
            let steps = Self::step_keys(&table, run_id)?;
            for step in &steps {
                table
                    .remove((run_id, step.as_str()))
                    .map_err(storage("redb remove"))?;
            }
            steps.len()
        };
        txn.commit().map_err(storage("redb clear commit"))?;
        Ok(removed)
    }

    fn prune_runs(&self, keep: usize) -> Result<usize, CheckpointError> {
        let doomed: Vec<String> = self
            .all_runs()?
            .into_iter()
            .skip(keep)
            .filter(|r| r.status != RunStatus::Running)
            .map(|r| r.run_id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(storage("redb prune txn"))?;
        {
            let mut runs = txn.open_table(RUNS_TABLE).map_err(storage("redb prune table"))?;
            let mut steps = txn.open_table(STEPS_TABLE).map_err(storage("redb prune table"))?;
            for run_id in &doomed {
                runs.remove(run_id.as_str()).map_err(storage("redb remove"))?;
                for step in Self::step_keys(&steps, run_id)? {
                    steps
                        .remove((run_id.as_str(), step.as_str()))
                        .map_err(storage("redb remove"))?;
                }
            }
        }
        txn.commit().map_err(storage("redb prune commit"))?;
        Ok(doomed.len())
    }

    fn load_cursor(&self, scheduler_id: &str) -> Result<Option<SchedulerCursor>, CheckpointError> {
        self.get(CURSORS_TABLE, scheduler_id)?
            .map(|bytes| decode(scheduler_id, &bytes))
            .transpose()
    }

    fn save_cursor(&self, cursor: &SchedulerCursor) -> Result<(), CheckpointError> {
        let bytes = encode(&cursor.scheduler_id, cursor)?;
        self.put(CURSORS_TABLE, &cursor.scheduler_id, &bytes)
    }
}
