//! Storage module for persisting scraped records
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Idempotent upserts of legislators, committees, bills and votes
//! - Session-versioned committee history
//! - Run bookkeeping

mod loaders;
mod schema;
mod sqlite;
mod traits;

pub use loaders::{
    load_bill, load_committee, load_legislator, load_vote, BillRecord, CommitteeRecord,
    LegislatorRecord, VoteRecord,
};
pub use schema::{get_schema_version, initialize_schema};
pub use sqlite::SqliteStore;
pub use traits::{LoadFn, RunStore, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub nodes_completed: u64,
    pub nodes_failed: u64,
}

/// Number of rows per entity table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub legislators: u64,
    pub committees: u64,
    pub committee_versions: u64,
    pub bills: u64,
    pub bill_sponsors: u64,
    pub votes: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
