//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - The end-of-run summary assembled by the coordinator
//! - Database statistics for the `--stats` command

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{print_summary, CrawlSummary};
