//! Pipeline stage workers
//!
//! Each stage runs one worker task that pulls from its input queue and
//! pushes to the next stage. The loop shared by all stages lives in
//! [`run_worker`]; the stages only implement [`StageWorker::process`].
//!
//! - `FetchWorker`: downloads pages, discovers links, grows the graph
//! - `ProcessWorker`: extracts and transforms content, resolves references
//! - `LoadWorker`: upserts records and completes nodes

mod fetch;
mod load;
mod process;

pub use fetch::FetchWorker;
pub use load::{LoadWorker, LoaderRecord};
pub use process::ProcessWorker;

use super::queue::{Message, WorkQueue};
use crate::graph::{read_graph, write_graph, NodeId, SharedGraph};
use crate::registry::{Registry, Stage};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error};

/// URLs fully processed in this or an earlier run
pub type KnownLinks = Arc<Mutex<HashSet<String>>>;

/// Outcome of processing one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The node moved on to the next stage
    Forwarded,
    /// The node reached Completed
    Completed,
    /// The node went back onto this stage's queue
    Requeued,
    /// The item was parked by the worker and stays unfinished
    Deferred,
}

/// Per-stage counters returned when a worker exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub stage: Stage,
    /// Items finished, whether forwarded, completed or requeued
    pub processed: u64,
    pub completed: u64,
    pub requeued: u64,
    pub failed: u64,
    pub deferred: u64,
}

impl WorkerReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            completed: 0,
            requeued: 0,
            failed: 0,
            deferred: 0,
        }
    }
}

/// State shared by every stage worker
#[derive(Clone)]
pub struct WorkerContext {
    pub graph: SharedGraph,
    pub registry: Arc<Registry>,
    pub known_links: KnownLinks,
    pub strict: bool,
}

impl WorkerContext {
    fn known(&self) -> MutexGuard<'_, HashSet<String>> {
        self.known_links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.known().contains(url)
    }

    pub fn remember(&self, url: &str) {
        self.known().insert(url.to_string());
    }

    /// Marks a node failed and offers it to pruning
    ///
    /// Returns the node's URL for logging, if the node still exists.
    pub fn fail_node(&self, id: NodeId) -> Option<String> {
        let mut graph = write_graph(&self.graph);
        let url = graph.get_mut(id).map(|node| {
            node.fail();
            node.url.clone()
        });
        graph.prune_settled(id);
        url
    }

    /// URL of a node, for logging
    pub fn node_url(&self, id: NodeId) -> Option<String> {
        read_graph(&self.graph).get(id).map(|node| node.url.clone())
    }
}

/// A pipeline stage
#[async_trait]
pub trait StageWorker: Send {
    type Item: Send + 'static;

    fn stage(&self) -> Stage;

    fn context(&self) -> &WorkerContext;

    /// Node an item belongs to
    fn node_of(item: &Self::Item) -> NodeId;

    /// An item the worker parked earlier that is ready to run again
    fn ready_item(&mut self) -> Option<Self::Item> {
        None
    }

    /// Time left until a parked item comes due
    ///
    /// While this returns `Some`, the worker waits instead of popping new
    /// work, so a parked item keeps its place ahead of items queued after it.
    fn parked_wait(&self) -> Option<Duration> {
        None
    }

    /// Handles one item
    async fn process(&mut self, item: Self::Item) -> Result<Disposition>;
}

/// Runs a worker until its queue delivers `Shutdown`
///
/// Errors are node-level: the node goes to Error, the item is finished, and
/// the loop carries on. A deferred item stays unfinished in the queue's
/// accounting until the worker takes it back through `ready_item`, and no
/// new item is popped while one is parked.
///
/// # Arguments
///
/// * `worker` - The stage implementation
/// * `queue` - The stage's input queue
/// * `poll` - Default queue poll timeout
///
/// # Returns
///
/// Counters for the items the worker handled
pub async fn run_worker<W>(
    mut worker: W,
    queue: Arc<WorkQueue<W::Item>>,
    poll: Duration,
) -> WorkerReport
where
    W: StageWorker + 'static,
{
    let stage = worker.stage();
    let mut report = WorkerReport::new(stage);
    debug!(%stage, queue = queue.name(), "Worker started");

    loop {
        let item = match worker.ready_item() {
            Some(item) => item,
            None => {
                if let Some(wait) = worker.parked_wait() {
                    tokio::time::sleep(wait.min(poll)).await;
                    continue;
                }
                match queue.pop(poll).await {
                    Some(Message::Item(item)) => item,
                    Some(Message::Shutdown) => break,
                    None => continue,
                }
            }
        };

        let id = W::node_of(&item);
        match worker.process(item).await {
            Ok(Disposition::Forwarded) => {
                report.processed += 1;
                queue.task_done();
            }
            Ok(Disposition::Completed) => {
                report.processed += 1;
                report.completed += 1;
                queue.task_done();
            }
            Ok(Disposition::Requeued) => {
                report.processed += 1;
                report.requeued += 1;
                queue.task_done();
            }
            Ok(Disposition::Deferred) => {
                report.deferred += 1;
            }
            Err(e) => {
                let url = worker.context().fail_node(id);
                error!(
                    %stage,
                    node = id,
                    url = url.as_deref().unwrap_or("<removed>"),
                    error = %e,
                    "Node failed"
                );
                report.failed += 1;
                queue.task_done();
            }
        }
    }

    debug!(
        %stage,
        processed = report.processed,
        completed = report.completed,
        failed = report.failed,
        deferred = report.deferred,
        "Worker stopped"
    );
    report
}
