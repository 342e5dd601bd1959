use super::{Disposition, StageWorker, WorkerContext};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::queue::WorkQueue;
use crate::crawler::scheduler::RateLimiter;
use crate::extract::Extractor;
use crate::graph::{read_graph, write_graph, NodeData, NodeId, HTML_KEY, SESSION_KEY};
use crate::registry::{PageType, Stage};
use crate::state::PipelineState;
use crate::url::{domain_of, resolve_link};
use crate::{Result, StatehouseError, UrlError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Downloads pages and grows the graph with the links they contain
pub struct FetchWorker {
    ctx: WorkerContext,
    fetcher: Fetcher,
    limiter: Arc<RateLimiter<NodeId>>,
    fetch_queue: Arc<WorkQueue<NodeId>>,
    process_queue: Arc<WorkQueue<NodeId>>,
}

impl FetchWorker {
    pub fn new(
        ctx: WorkerContext,
        fetcher: Fetcher,
        limiter: Arc<RateLimiter<NodeId>>,
        fetch_queue: Arc<WorkQueue<NodeId>>,
        process_queue: Arc<WorkQueue<NodeId>>,
    ) -> Self {
        Self {
            ctx,
            fetcher,
            limiter,
            fetch_queue,
            process_queue,
        }
    }

    /// Extracts link hrefs with the page type's fetch template
    ///
    /// Every string in the template's output is treated as an href and
    /// resolved against the page URL. Pages without a fetch template have
    /// no outgoing links.
    fn discover_links(&self, page_type: PageType, url: &str, html: &str) -> Result<Vec<String>> {
        let Some(template) = self.ctx.registry.fetch_template(page_type) else {
            return Ok(Vec::new());
        };

        let content = Extractor::new(self.ctx.strict).extract(template, html)?;

        let mut links = Vec::new();
        for value in content.values() {
            for href in strings(value) {
                if let Some(link) = resolve_link(href, url) {
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
            }
        }
        Ok(links)
    }

    /// Adds discovered links under the parent node
    ///
    /// Known and unclassifiable links are skipped; links to pages already in
    /// the graph only gain an edge. New pages inherit the parent's session
    /// and are returned so they can be queued.
    fn attach_links(&self, parent: NodeId, session: Option<&Value>, links: &[String]) -> Vec<NodeId> {
        let mut created = Vec::new();
        let mut graph = write_graph(&self.ctx.graph);

        for link in links {
            if self.ctx.is_known(link) {
                trace!(url = %link, "Skipping known link");
                continue;
            }
            let Some(page_type) = self.ctx.registry.classify_url(link) else {
                trace!(url = %link, "Skipping unclassified link");
                continue;
            };

            if let Some(existing) = graph.find_by_url(link) {
                graph.link(parent, existing);
                continue;
            }

            let mut data = NodeData::new();
            if let Some(session) = session {
                data.insert(SESSION_KEY.to_string(), session.clone());
            }
            let id = graph.add_node(
                link,
                page_type,
                &[parent],
                Some(data),
                Some(PipelineState::AwaitingFetch),
            );
            created.push(id);
        }

        created
    }
}

fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().flat_map(strings).collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl StageWorker for FetchWorker {
    type Item = NodeId;

    fn stage(&self) -> Stage {
        Stage::Fetch
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn node_of(item: &NodeId) -> NodeId {
        *item
    }

    fn ready_item(&mut self) -> Option<NodeId> {
        self.limiter.pop_due()
    }

    fn parked_wait(&self) -> Option<Duration> {
        self.limiter.time_until_next()
    }

    async fn process(&mut self, id: NodeId) -> Result<Disposition> {
        let (url, page_type, session) = {
            let graph = read_graph(&self.ctx.graph);
            let node = graph.get(id).ok_or(StatehouseError::NodeNotFound(id))?;
            (
                node.url.clone(),
                node.page_type,
                node.data.get(SESSION_KEY).cloned(),
            )
        };

        let domain = domain_of(&url).ok_or(UrlError::MissingDomain)?;
        if !self.limiter.can_fetch_now(&domain) {
            let when = self.limiter.next_allowed(&domain);
            trace!(node = id, %domain, "Deferring fetch");
            self.limiter.schedule_retry(&domain, id, when);
            return Ok(Disposition::Deferred);
        }

        {
            let mut graph = write_graph(&self.ctx.graph);
            let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
            node.advance(PipelineState::Fetching)?;
        }

        self.limiter.mark_fetched(&domain);
        let html = self.fetcher.fetch(&url).await?;

        let links = self.discover_links(page_type, &url, &html)?;
        let created = self.attach_links(id, session.as_ref(), &links);
        debug!(
            node = id,
            url = %url,
            links = links.len(),
            new = created.len(),
            "Fetched page"
        );
        for child in created {
            self.fetch_queue.push(child);
        }

        if self.ctx.registry.has_process(page_type) {
            {
                let mut graph = write_graph(&self.ctx.graph);
                let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
                node.data.insert(HTML_KEY.to_string(), Value::String(html));
                node.advance(PipelineState::AwaitingProcessing)?;
            }
            self.process_queue.push(id);
            Ok(Disposition::Forwarded)
        } else {
            {
                let mut graph = write_graph(&self.ctx.graph);
                let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
                node.advance(PipelineState::Completed)?;
                graph.prune_settled(id);
            }
            self.ctx.remember(&url);
            Ok(Disposition::Completed)
        }
    }
}
