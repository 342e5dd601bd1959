//! SQLite storage implementation
//!
//! This module provides the SQLite-backed store used by the Load stage and
//! by the coordinator's run bookkeeping.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LoadFn, RunStore, StorageError, StorageResult};
use crate::storage::{EntityCounts, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) a database file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers and a single writer per connection
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Runs a loader inside a transaction
    ///
    /// The transaction is committed when the loader succeeds and rolled back
    /// otherwise, leaving the connection usable for the next record.
    pub fn load_in_transaction(
        &mut self,
        load: LoadFn,
        params: &Map<String, Value>,
    ) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;
        match load(&tx, params) {
            Ok(id) => {
                tx.commit()?;
                Ok(id)
            }
            Err(e) => {
                debug!(error = %e, "Rolling back load");
                tx.rollback()?;
                Err(e)
            }
        }
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
        nodes_completed: row.get::<_, i64>(5)? as u64,
        nodes_failed: row.get::<_, i64>(6)? as u64,
    })
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, nodes_completed, nodes_failed";

impl RunStore for SqliteStore {
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .map_err(|_| StorageError::RunNotFound(run_id))
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        nodes_completed: u64,
        nodes_failed: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs
             SET status = ?1, finished_at = ?2, nodes_completed = ?3, nodes_failed = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                nodes_completed as i64,
                nodes_failed as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn latest_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn entity_counts(&self) -> StorageResult<EntityCounts> {
        Ok(EntityCounts {
            legislators: self.count("legislators")?,
            committees: self.count("committees")?,
            committee_versions: self.count("committee_versions")?,
            bills: self.count("bills")?,
            bill_sponsors: self.count("bill_sponsors")?,
            votes: self.count("votes")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn failing_load(conn: &Connection, _params: &Map<String, Value>) -> StorageResult<i64> {
        conn.execute(
            "INSERT INTO committees (code, name, url, updated_at) VALUES ('X', 'X', 'x', 'now')",
            [],
        )?;
        conn.execute("INSERT INTO nowhere VALUES (1)", [])?;
        Ok(1)
    }

    fn committee_load(conn: &Connection, params: &Map<String, Value>) -> StorageResult<i64> {
        let code = params.get("code").and_then(Value::as_str).unwrap_or("Y");
        conn.execute(
            "INSERT INTO committees (code, name, url, updated_at) VALUES (?1, 'Y', 'y', 'now')",
            params![code],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[test]
    fn test_create_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&dir.path().join("test.db"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_create_and_finish_run() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let run_id = store.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        store.finish_run(run_id, RunStatus::Completed, 10, 2).unwrap();
        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.nodes_completed, 10);
        assert_eq!(run.nodes_failed, 2);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_missing_run() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.get_run(42), Err(StorageError::RunNotFound(42))));
        assert!(store.finish_run(42, RunStatus::Failed, 0, 0).is_err());
    }

    #[test]
    fn test_latest_runs_newest_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.create_run("a").unwrap();
        let second = store.create_run("b").unwrap();

        let runs = store.latest_runs(5).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = store.load_in_transaction(failing_load, &Map::new());
        assert!(result.is_err());
        assert_eq!(store.entity_counts().unwrap().committees, 0);

        // Connection stays usable
        let params = json!({"code": "Z"}).as_object().cloned().unwrap();
        let id = store.load_in_transaction(committee_load, &params).unwrap();
        assert!(id > 0);
        assert_eq!(store.entity_counts().unwrap().committees, 1);
    }
}
