use std::path::Path;
use std::sync::Arc;

use domain::common::error::StoreError;
use redb::{Database, TableDefinition};

/// Open (or create) the redb file shared by the store adapters.
///
/// redb allows a single handle per file and process, so the document,
/// cache and vector adapters share one `Arc<Database>`.
pub fn open_database(path: &Path) -> Result<Arc<Database>, StoreError> {
    let db = Database::create(path)
        .map_err(|e| StoreError::Unavailable(format!("redb open failed: {e}")))?;
    Ok(Arc::new(db))
}

/// Create `table` if it does not exist yet.
pub(crate) fn ensure_table<K, V>(db: &Database, table: TableDefinition<'_, K, V>) -> Result<(), StoreError>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    let txn = db.begin_write().map_err(unavailable("redb txn begin"))?;
    {
        let _table = txn.open_table(table).map_err(unavailable("redb table create"))?;
    }
    txn.commit().map_err(unavailable("redb commit"))?;
    Ok(())
}

/// Map a redb error to a transient store error tagged with `context`.
pub(crate) fn unavailable<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StoreError {
    move |e| StoreError::Unavailable(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const PROBE: TableDefinition<&str, u64> = TableDefinition::new("probe");

    #[test]
    fn open_and_create_table() {
        let tmp = NamedTempFile::new().unwrap();
        let db = open_database(tmp.path()).unwrap();
        ensure_table(&db, PROBE).unwrap();
        // Idempotent.
        ensure_table(&db, PROBE).unwrap();
    }

    #[test]
    fn unavailable_tags_context() {
        let err = unavailable::<&str>("redb insert")("disk full");
        assert_eq!(err, StoreError::Unavailable("redb insert: disk full".into()));
    }
}
