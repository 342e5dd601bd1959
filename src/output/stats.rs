//! Statistics from the crawl database
//!
//! This module provides functionality for extracting and displaying what a
//! database holds: entity row counts and the most recent crawl runs.

use crate::storage::{EntityCounts, RunRecord, RunStore, StorageResult};

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Rows per entity table
    pub counts: EntityCounts,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
/// * `run_limit` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn RunStore, run_limit: usize) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        counts: store.entity_counts()?,
        recent_runs: store.latest_runs(run_limit)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    let counts = &stats.counts;
    println!("Records:");
    println!("  Legislators: {}", counts.legislators);
    println!(
        "  Committees: {} ({} session versions)",
        counts.committees, counts.committee_versions
    );
    println!(
        "  Bills: {} ({} sponsorships)",
        counts.bills, counts.bill_sponsors
    );
    println!("  Votes: {}", counts.votes);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No crawl runs recorded");
        return;
    }

    println!("Recent Runs ({}):", stats.recent_runs.len());
    for run in &stats.recent_runs {
        println!(
            "  #{} {} started {} finished {} ({} completed, {} failed)",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-"),
            run.nodes_completed,
            run.nodes_failed
        );
    }

    let completed: u64 = stats.recent_runs.iter().map(|r| r.nodes_completed).sum();
    let failed: u64 = stats.recent_runs.iter().map(|r| r.nodes_failed).sum();
    let success_rate = if completed + failed > 0 {
        (completed as f64 / (completed + failed) as f64) * 100.0
    } else {
        0.0
    };
    println!();
    println!(
        "Success Rate: {:.1}% ({} / {} nodes completed)",
        success_rate,
        completed,
        completed + failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RunStatus, SqliteStore};

    #[test]
    fn test_load_statistics() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.create_run("hash").unwrap();
        store.finish_run(first, RunStatus::Completed, 5, 1).unwrap();
        let second = store.create_run("hash").unwrap();

        let stats = load_statistics(&store, 10).unwrap();
        assert_eq!(stats.counts, EntityCounts::default());
        assert_eq!(stats.recent_runs.len(), 2);
        assert_eq!(stats.recent_runs[0].id, second);
        assert_eq!(stats.recent_runs[1].nodes_completed, 5);
    }

    #[test]
    fn test_run_limit() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for _ in 0..3 {
            store.create_run("hash").unwrap();
        }
        let stats = load_statistics(&store, 1).unwrap();
        assert_eq!(stats.recent_runs.len(), 1);
    }
}
