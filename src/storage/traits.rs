//! Storage traits and error types
//!
//! This module defines the run bookkeeping interface, the signature of
//! per-page-type loaders, and the associated error types.

use crate::storage::{EntityCounts, RunRecord, RunStatus};
use crate::transform::ValidationError;
use rusqlite::Connection;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Upserts one loader record and returns the affected row id
///
/// Called inside a transaction; the caller commits or rolls back.
pub type LoadFn = fn(&Connection, &Map<String, Value>) -> StorageResult<i64>;

/// Run bookkeeping
pub trait RunStore {
    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Marks a run as finished with its final status and node counts
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        nodes_completed: u64,
        nodes_failed: u64,
    ) -> StorageResult<()>;

    /// Most recent runs, newest first
    fn latest_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Row counts of the entity tables
    fn entity_counts(&self) -> StorageResult<EntityCounts>;
}
