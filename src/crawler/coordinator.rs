//! Crawler coordinator - crawl orchestration
//!
//! The coordinator owns everything the stage workers share and drives a run
//! from start to finish:
//! - Loading the checkpoint and known links, or starting fresh
//! - Rescheduling unfinished nodes from an earlier run
//! - Spawning one worker task per stage
//! - Injecting seeds as roots, one active root per session
//! - Draining the queues in stage order with periodic checkpoints
//! - Shutting the workers down and recording the run

use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::queue::{Discipline, WorkQueue};
use crate::crawler::scheduler::RateLimiter;
use crate::crawler::workers::{
    run_worker, FetchWorker, KnownLinks, LoadWorker, LoaderRecord, ProcessWorker, WorkerContext,
    WorkerReport,
};
use crate::graph::{
    load_known_links, read_graph, save_known_links, write_graph, Graph, NodeData, NodeId,
    SharedGraph, HTML_KEY, SESSION_KEY,
};
use crate::output::CrawlSummary;
use crate::registry::{legislature_registry, Registry};
use crate::state::PipelineState;
use crate::storage::{RunStatus, RunStore, SqliteStore};
use crate::url::normalize_url;
use crate::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Writes the graph checkpoint and the known-links cache
///
/// Cloneable and independent of the coordinator, so a signal handler can
/// save progress while a run is in flight.
#[derive(Clone)]
pub struct Checkpointer {
    graph: SharedGraph,
    known_links: KnownLinks,
    checkpoint_path: PathBuf,
    known_links_path: PathBuf,
}

impl Checkpointer {
    pub fn save(&self) -> Result<()> {
        read_graph(&self.graph).save(&self.checkpoint_path)?;

        let links = self
            .known_links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        save_known_links(&self.known_links_path, &links)?;
        Ok(())
    }
}

/// Main crawl coordinator structure
pub struct Coordinator {
    config: Config,
    registry: Arc<Registry>,
    graph: SharedGraph,
    known_links: KnownLinks,
    store: SqliteStore,
    run_id: i64,
    fetch_queue: Arc<WorkQueue<NodeId>>,
    process_queue: Arc<WorkQueue<NodeId>>,
    load_queue: Arc<WorkQueue<LoaderRecord>>,
    limiter: Arc<RateLimiter<NodeId>>,
    last_checkpoint: Instant,
}

impl Coordinator {
    /// Creates a new coordinator instance and records the run
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `registry` - Page types, routes and templates to crawl with
    /// * `config_hash` - Hash of the configuration file, stored on the run row
    /// * `fresh` - Ignore any checkpoint and known-links cache on disk
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(StatehouseError)` - The database or checkpoint could not be opened
    pub fn new(config: Config, registry: Registry, config_hash: &str, fresh: bool) -> Result<Self> {
        let mut store = SqliteStore::new(&config.output.database_path)?;

        let (graph, known) = if fresh {
            info!("Starting fresh, ignoring checkpoint and known links");
            (Graph::new(config.http.crawler_name.clone()), HashSet::new())
        } else {
            let graph = if config.output.checkpoint_path.exists() {
                Graph::load(&config.output.checkpoint_path)?
            } else {
                Graph::new(config.http.crawler_name.clone())
            };
            (graph, load_known_links(&config.output.known_links_path)?)
        };

        let run_id = store.create_run(config_hash)?;
        info!(
            run_id,
            nodes = graph.len(),
            known_links = known.len(),
            "Initialized crawl run"
        );

        let limiter = RateLimiter::new(config.crawler.min_delay());

        Ok(Self {
            config,
            registry: Arc::new(registry),
            graph: graph.into_shared(),
            known_links: Arc::new(Mutex::new(known)),
            store,
            run_id,
            fetch_queue: Arc::new(WorkQueue::new("fetch", Discipline::Lifo)),
            process_queue: Arc::new(WorkQueue::new("process", Discipline::Fifo)),
            load_queue: Arc::new(WorkQueue::new("load", Discipline::Fifo)),
            limiter: Arc::new(limiter),
            last_checkpoint: Instant::now(),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    pub fn checkpointer(&self) -> Checkpointer {
        Checkpointer {
            graph: Arc::clone(&self.graph),
            known_links: Arc::clone(&self.known_links),
            checkpoint_path: self.config.output.checkpoint_path.clone(),
            known_links_path: self.config.output.known_links_path.clone(),
        }
    }

    /// Runs the crawl to completion
    ///
    /// 1. Reschedule unfinished nodes from the checkpoint
    /// 2. Spawn the fetch, process and load workers
    /// 3. Inject seeds, one active root per session
    /// 4. Drain the fetch, process and load queues in that order
    /// 5. Shut the workers down, save the checkpoint, finish the run row
    ///
    /// The workers are shut down even when seeding or draining fails.
    pub async fn run(mut self) -> Result<CrawlSummary> {
        let started = Instant::now();
        info!(run_id = self.run_id, "Starting crawl run");

        let resumed = self.resume();
        let handles = self.spawn_workers()?;
        let crawled = self.crawl().await;
        let reports = self.shutdown(handles).await;

        let roots_seeded = match crawled {
            Ok(seeded) => seeded,
            Err(e) => {
                error!(run_id = self.run_id, error = %e, "Crawl failed");
                if let Err(save_err) = self.checkpointer().save() {
                    error!(error = %save_err, "Failed to save checkpoint");
                }
                let completed: u64 = reports.iter().map(|r| r.completed).sum();
                let failed: u64 = reports.iter().map(|r| r.failed).sum();
                self.store
                    .finish_run(self.run_id, RunStatus::Failed, completed, failed)?;
                return Err(e);
            }
        };

        let drained = {
            let mut graph = write_graph(&self.graph);
            let drained = graph.unsettled().is_empty();
            if drained {
                let removed = graph.cleanup();
                debug!(removed, "Removed orphan nodes");
            }
            drained
        };
        self.checkpointer().save()?;

        let status = if drained && reports.len() == 3 {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };

        let summary = CrawlSummary {
            run_id: self.run_id,
            status,
            elapsed: started.elapsed(),
            roots_seeded,
            resumed,
            reports,
            remaining: read_graph(&self.graph).state_counts(),
        };
        self.store.finish_run(
            self.run_id,
            status,
            summary.completed(),
            summary.failed(),
        )?;

        info!(
            run_id = self.run_id,
            status = status.to_db_string(),
            completed = summary.completed(),
            failed = summary.failed(),
            elapsed = ?summary.elapsed,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Sends every unsettled node back to the fetch queue
    ///
    /// Stashed HTML does not survive a checkpoint, so the page has to be
    /// downloaded again whatever stage it had reached.
    fn resume(&self) -> usize {
        let ids = {
            let mut graph = write_graph(&self.graph);
            let ids = graph.unsettled();
            for id in &ids {
                if let Some(node) = graph.get_mut(*id) {
                    node.reschedule();
                    node.data.remove(HTML_KEY);
                }
            }
            ids
        };

        // LIFO queue: push in reverse so the oldest node is fetched first
        for id in ids.iter().rev() {
            self.fetch_queue.push(*id);
        }
        if !ids.is_empty() {
            info!(nodes = ids.len(), "Resuming unfinished nodes from checkpoint");
        }
        ids.len()
    }

    fn spawn_workers(&self) -> Result<Vec<JoinHandle<WorkerReport>>> {
        let ctx = WorkerContext {
            graph: Arc::clone(&self.graph),
            registry: Arc::clone(&self.registry),
            known_links: Arc::clone(&self.known_links),
            strict: self.config.crawler.strict,
        };
        let poll = self.config.crawler.poll_interval();

        let fetch = FetchWorker::new(
            ctx.clone(),
            Fetcher::new(self.config.http.clone()),
            Arc::clone(&self.limiter),
            Arc::clone(&self.fetch_queue),
            Arc::clone(&self.process_queue),
        );
        let process = ProcessWorker::new(
            ctx.clone(),
            Arc::clone(&self.process_queue),
            Arc::clone(&self.load_queue),
            self.config.crawler.lookup_backoff(),
            self.config.crawler.max_lookup_attempts,
        );
        let load = LoadWorker::new(ctx, SqliteStore::new(&self.config.output.database_path)?);

        Ok(vec![
            tokio::spawn(run_worker(fetch, Arc::clone(&self.fetch_queue), poll)),
            tokio::spawn(run_worker(process, Arc::clone(&self.process_queue), poll)),
            tokio::spawn(run_worker(load, Arc::clone(&self.load_queue), poll)),
        ])
    }

    /// Injects every seed and waits for the pipeline to empty
    ///
    /// # Returns
    ///
    /// The number of roots injected
    async fn crawl(&mut self) -> Result<usize> {
        let mut pending = self.pending_seeds();
        let mut active = self.active_roots();
        let mut seeded = 0;
        let poll = self.config.crawler.poll_interval();

        while pending.iter().any(|(_, seeds)| !seeds.is_empty()) {
            for (session, seeds) in pending.iter_mut() {
                if let Some(&root) = active.get(session.as_str()) {
                    if self.root_active(root) {
                        continue;
                    }
                    debug!(session = %session, root, "Root drained");
                    active.remove(session.as_str());
                }

                while let Some(seed) = seeds.pop_front() {
                    if let Some(root) = self.inject_root(session, &seed) {
                        active.insert(session.clone(), root);
                        seeded += 1;
                        break;
                    }
                }
            }

            self.maybe_checkpoint()?;
            tokio::time::sleep(poll).await;
        }

        info!(seeded, "All seeds injected, draining");

        let fetch_queue = Arc::clone(&self.fetch_queue);
        self.drain(&fetch_queue).await?;
        let process_queue = Arc::clone(&self.process_queue);
        self.drain(&process_queue).await?;
        let load_queue = Arc::clone(&self.load_queue);
        self.drain(&load_queue).await?;

        Ok(seeded)
    }

    /// Configured seeds per session, minus those already crawled or queued
    fn pending_seeds(&self) -> Vec<(String, VecDeque<String>)> {
        let graph = read_graph(&self.graph);
        let known = self
            .known_links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut pending = Vec::new();
        for session in &self.config.sessions {
            let mut seeds = VecDeque::new();
            for seed in &session.seeds {
                let url = match normalize_url(seed) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(seed = %seed, error = %e, "Skipping invalid seed");
                        continue;
                    }
                };
                if known.contains(&url) || graph.find_by_url(&url).is_some() {
                    debug!(session = %session.name, url = %url, "Seed already crawled or queued");
                    continue;
                }
                if !seeds.contains(&url) {
                    seeds.push_back(url);
                }
            }
            if !seeds.is_empty() {
                pending.push((session.name.clone(), seeds));
            }
        }
        pending
    }

    /// Roots carried over from a checkpoint that still have work below them
    fn active_roots(&self) -> HashMap<String, NodeId> {
        let graph = read_graph(&self.graph);
        graph
            .roots()
            .iter()
            .filter(|&&root| !graph.subtree_settled(root))
            .filter_map(|&root| {
                let session = graph.get(root)?.session()?.to_string();
                Some((session, root))
            })
            .collect()
    }

    fn root_active(&self, root: NodeId) -> bool {
        let graph = read_graph(&self.graph);
        graph.get(root).is_some() && !graph.subtree_settled(root)
    }

    /// Adds a seed to the graph as a root and queues it for fetching
    ///
    /// Returns `None` if the seed was crawled meanwhile or no route
    /// classifies it.
    fn inject_root(&self, session: &str, url: &str) -> Option<NodeId> {
        let Some(page_type) = self.registry.classify_url(url) else {
            warn!(session, url, "Skipping seed with no matching route");
            return None;
        };

        let id = {
            let mut graph = write_graph(&self.graph);
            let known = self
                .known_links
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains(url);
            if known || graph.find_by_url(url).is_some() {
                debug!(session, url, "Seed reached by an earlier root");
                return None;
            }

            let mut data = NodeData::new();
            data.insert(SESSION_KEY.to_string(), Value::String(session.to_string()));
            graph.add_node(
                url,
                page_type,
                &[],
                Some(data),
                Some(PipelineState::AwaitingFetch),
            )
        };

        self.fetch_queue.push(id);
        info!(session, url, page_type = %page_type, node = id, "Injected root");
        Some(id)
    }

    /// Waits for a queue to empty, checkpointing while it works
    async fn drain<T>(&mut self, queue: &WorkQueue<T>) -> Result<()> {
        let interval = self.config.crawler.checkpoint_interval();
        loop {
            match tokio::time::timeout(interval, queue.join()).await {
                Ok(()) => {
                    debug!(queue = queue.name(), "Queue drained");
                    return Ok(());
                }
                Err(_) => self.maybe_checkpoint()?,
            }
        }
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        if self.last_checkpoint.elapsed() < self.config.crawler.checkpoint_interval() {
            return Ok(());
        }

        self.checkpointer().save()?;
        self.last_checkpoint = Instant::now();

        let nodes = read_graph(&self.graph).len();
        info!(
            nodes,
            fetch = self.fetch_queue.unfinished(),
            process = self.process_queue.unfinished(),
            load = self.load_queue.unfinished(),
            deferred = self.limiter.pending_retries(),
            "Progress: checkpoint saved"
        );
        Ok(())
    }

    /// Stops the workers and collects their reports
    ///
    /// Workers that do not stop within the join timeout are aborted and
    /// contribute no report.
    async fn shutdown(&self, handles: Vec<JoinHandle<WorkerReport>>) -> Vec<WorkerReport> {
        self.fetch_queue.shutdown();
        self.process_queue.shutdown();
        self.load_queue.shutdown();

        let timeout = self.config.crawler.join_timeout();
        let mut reports = Vec::with_capacity(handles.len());
        for mut handle in handles {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => error!(error = %e, "Worker task failed"),
                Err(_) => {
                    warn!(?timeout, "Worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        reports
    }
}

/// Runs a crawl with the legislature registry
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Ignore any checkpoint and known-links cache on disk
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - What the run did
/// * `Err(StatehouseError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use statehouse::config::load_config_with_hash;
/// use statehouse::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("statehouse.toml"))?;
/// let summary = run_crawl(config, &hash, false).await?;
/// println!("{} nodes completed", summary.completed());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: &str, fresh: bool) -> Result<CrawlSummary> {
    let registry = legislature_registry(config.crawler.tz()?);
    Coordinator::new(config, registry, config_hash, fresh)?
        .run()
        .await
}
