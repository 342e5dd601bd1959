//! End-of-run crawl summary

use crate::crawler::WorkerReport;
use crate::registry::Stage;
use crate::state::PipelineState;
use crate::storage::RunStatus;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a crawl run did, assembled by the coordinator when it shuts down
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub elapsed: Duration,

    /// Roots injected from configured seeds during this run
    pub roots_seeded: usize,

    /// Unsettled nodes picked up from a checkpoint
    pub resumed: usize,

    /// One report per stage worker that shut down cleanly
    pub reports: Vec<WorkerReport>,

    /// Nodes still in the graph, by state
    pub remaining: BTreeMap<PipelineState, usize>,
}

impl CrawlSummary {
    /// Nodes that reached Completed in any stage
    pub fn completed(&self) -> u64 {
        self.reports.iter().map(|r| r.completed).sum()
    }

    /// Nodes that went to Error in any stage
    pub fn failed(&self) -> u64 {
        self.reports.iter().map(|r| r.failed).sum()
    }

    pub fn report(&self, stage: Stage) -> Option<&WorkerReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    /// Number of nodes left in the graph
    pub fn remaining_nodes(&self) -> usize {
        self.remaining.values().sum()
    }
}

/// Prints a crawl summary to stdout
///
/// # Arguments
///
/// * `summary` - The summary returned by the coordinator
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Run {}: {}", summary.run_id, summary.status.to_db_string());
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Roots seeded: {}", summary.roots_seeded);
    if summary.resumed > 0 {
        println!("  Resumed from checkpoint: {}", summary.resumed);
    }
    println!("  Nodes completed: {}", summary.completed());
    println!("  Nodes failed: {}", summary.failed());
    println!();

    println!("Stages:");
    for report in &summary.reports {
        println!(
            "  {}: {} processed, {} completed, {} requeued, {} failed, {} deferred",
            report.stage,
            report.processed,
            report.completed,
            report.requeued,
            report.failed,
            report.deferred
        );
    }
    println!();

    if summary.remaining.is_empty() {
        println!("Graph fully drained");
    } else {
        println!("Remaining in graph ({}):", summary.remaining_nodes());
        for (state, count) in &summary.remaining {
            println!("  {}: {}", state, count);
        }
    }
}
