//! Crawler module: the fetch, process and load pipeline
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with per-domain sessions and retries
//! - Work queues between the pipeline stages
//! - Per-domain rate limiting with deferred retries
//! - The stage workers
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod queue;
mod scheduler;
pub mod workers;

pub use coordinator::{run_crawl, Checkpointer, Coordinator};
pub use fetcher::{build_http_client, FetchError, Fetcher};
pub use queue::{Discipline, Message, WorkQueue};
pub use scheduler::RateLimiter;
pub use workers::{Disposition, KnownLinks, LoaderRecord, WorkerReport};
