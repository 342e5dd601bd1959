use super::load::LoaderRecord;
use super::{Disposition, StageWorker, WorkerContext};
use crate::crawler::queue::WorkQueue;
use crate::extract::Extractor;
use crate::graph::{
    read_graph, write_graph, Graph, Node, NodeAttr, NodeId, NodeQuery, HTML_KEY, SESSION_KEY,
};
use crate::registry::{LookupDirection, PageType, Stage, StateLookup};
use crate::state::PipelineState;
use crate::transform::{TransformError, Transformer};
use crate::url::urls_match;
use crate::{Result, StatehouseError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Result of resolving a page's references
enum Lookups {
    Resolved(Map<String, Value>),
    /// A referenced page exists but has not settled yet
    Pending { url: String },
}

/// Extracts, cross-references and transforms page content
pub struct ProcessWorker {
    ctx: WorkerContext,
    process_queue: Arc<WorkQueue<NodeId>>,
    load_queue: Arc<WorkQueue<LoaderRecord>>,
    lookup_backoff: Duration,
    max_lookup_attempts: u32,
    lookup_attempts: HashMap<NodeId, u32>,
}

impl ProcessWorker {
    pub fn new(
        ctx: WorkerContext,
        process_queue: Arc<WorkQueue<NodeId>>,
        load_queue: Arc<WorkQueue<LoaderRecord>>,
        lookup_backoff: Duration,
        max_lookup_attempts: u32,
    ) -> Self {
        Self {
            ctx,
            process_queue,
            load_queue,
            lookup_backoff,
            max_lookup_attempts,
            lookup_attempts: HashMap::new(),
        }
    }

    /// Resolves every lookup of a template against the graph
    ///
    /// With `allow_pending` false, unsettled targets are skipped instead of
    /// making the whole resolution pending.
    fn resolve_lookups(
        &self,
        id: NodeId,
        lookups: &[StateLookup],
        content: &Map<String, Value>,
        allow_pending: bool,
    ) -> Result<Lookups> {
        let graph = read_graph(&self.ctx.graph);
        let mut resolved = Map::new();

        for lookup in lookups {
            let mut collected = Vec::new();

            for reference in content.get(&lookup.source_key).map(strings).unwrap_or_default() {
                let Some(target) = find_target(&graph, id, lookup, reference) else {
                    trace!(node = id, reference, key = %lookup.key, "Reference not in graph");
                    continue;
                };
                let Some(node) = graph.get(target) else {
                    continue;
                };

                if !node.is_settled() {
                    if allow_pending {
                        return Ok(Lookups::Pending {
                            url: node.url.clone(),
                        });
                    }
                    continue;
                }

                match node.data.get(&lookup.target_key) {
                    Some(Value::Array(values)) => collected.extend(values.iter().cloned()),
                    Some(value) => collected.push(value.clone()),
                    None => {}
                }
            }

            if collected.is_empty() {
                continue;
            }

            let value = (lookup.transform)(&Value::Array(collected)).map_err(|source| {
                TransformError::Field {
                    key: lookup.key.clone(),
                    source,
                }
            })?;
            resolved.insert(lookup.key.clone(), value);
        }

        Ok(Lookups::Resolved(resolved))
    }
}

/// Locates the page a reference points at
///
/// The lookup's preferred direction is searched first, then the whole graph.
fn find_target(graph: &Graph, id: NodeId, lookup: &StateLookup, reference: &str) -> Option<NodeId> {
    let predicate = |node: &Node| {
        node.page_type == lookup.target_type && urls_match(&node.url, reference)
    };

    let nearby = match lookup.direction {
        LookupDirection::Ancestors => graph.search_ancestors(id, predicate),
        LookupDirection::Descendants => graph.search_descendants(id, predicate),
    };

    nearby.or_else(|| {
        let query = NodeQuery::new()
            .with_attr(NodeAttr::PageType, Some(json!(lookup.target_type.as_str())))
            .with_attr(NodeAttr::Url, Some(json!(reference)));
        graph.find_matching(&query)
    })
}

fn strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().flat_map(strings).collect(),
        _ => Vec::new(),
    }
}

fn has_content(content: &Map<String, Value>) -> bool {
    content.values().any(|value| match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    })
}

#[async_trait]
impl StageWorker for ProcessWorker {
    type Item = NodeId;

    fn stage(&self) -> Stage {
        Stage::Process
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn node_of(item: &NodeId) -> NodeId {
        *item
    }

    async fn process(&mut self, id: NodeId) -> Result<Disposition> {
        let (url, page_type, session, html) = {
            let graph = read_graph(&self.ctx.graph);
            let node = graph.get(id).ok_or(StatehouseError::NodeNotFound(id))?;
            let html = node
                .data
                .get(HTML_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| StatehouseError::EmptyResult {
                    url: node.url.clone(),
                })?;
            (
                node.url.clone(),
                node.page_type,
                node.data.get(SESSION_KEY).cloned(),
                html,
            )
        };

        let registry = Arc::clone(&self.ctx.registry);
        let template = registry
            .process_template(page_type)
            .ok_or(StatehouseError::MissingTemplate {
                page_type,
                stage: Stage::Process,
            })?;
        let (extract, transform) = template.split();

        let content = Extractor::new(self.ctx.strict).extract(&extract, &html)?;
        if !has_content(&content) {
            return Err(StatehouseError::EmptyResult { url });
        }

        let attempts = self.lookup_attempts.get(&id).copied().unwrap_or(0);
        let allow_pending = attempts < self.max_lookup_attempts;
        let references = match self.resolve_lookups(id, &template.lookups, &content, allow_pending)? {
            Lookups::Resolved(references) => references,
            Lookups::Pending { url: target } => {
                self.lookup_attempts.insert(id, attempts + 1);
                trace!(node = id, waiting_on = %target, attempt = attempts + 1, "Reference pending");
                tokio::time::sleep(self.lookup_backoff).await;
                self.process_queue.push(id);
                return Ok(Disposition::Requeued);
            }
        };
        if !allow_pending {
            warn!(node = id, url = %url, attempts, "Giving up on unsettled references");
        }
        self.lookup_attempts.remove(&id);

        {
            let mut graph = write_graph(&self.ctx.graph);
            let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
            node.advance(PipelineState::Processing)?;
        }

        let outcome = Transformer::new(self.ctx.strict).transform(&transform, &content)?;
        if outcome.values.is_empty() {
            return Err(StatehouseError::EmptyResult { url });
        }
        if !outcome.failed_keys.is_empty() {
            warn!(node = id, url = %url, failed = ?outcome.failed_keys, "Some fields failed to transform");
        }

        let mut params = outcome.values;
        params.extend(references);
        if let Some(session) = session {
            params.insert(SESSION_KEY.to_string(), session);
        }
        params.insert("url".to_string(), Value::String(url.clone()));

        {
            let mut graph = write_graph(&self.ctx.graph);
            let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
            node.data.remove(HTML_KEY);
            for (key, value) in &params {
                node.data.insert(key.clone(), value.clone());
            }
            node.advance(PipelineState::AwaitingLoad)?;
        }

        debug!(node = id, url = %url, fields = params.len(), "Processed page");
        self.load_queue.push(LoaderRecord {
            node_id: id,
            page_type,
            params,
        });

        Ok(Disposition::Forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::queue::{Discipline, Message};
    use crate::extract::FieldSelector;
    use crate::graph::NodeData;
    use crate::registry::{ProcessTemplate, Registry};
    use crate::transform::functions;

    const BILL_HTML: &str = r#"
        <span class="bill-number">HB 5</span>
        <a class="sponsor" href="/Committees/Detail?id=1">Revenue</a>
    "#;

    fn create_test_registry() -> Registry {
        Registry::new().with_process(
            PageType::Bill,
            ProcessTemplate::new()
                .field("number", FieldSelector::text("span.bill-number"), functions::text())
                .field(
                    "sponsor_urls",
                    FieldSelector::attr("a.sponsor", "href"),
                    functions::text_list(),
                )
                .lookup(StateLookup {
                    key: "committee_id".to_string(),
                    source_key: "sponsor_urls".to_string(),
                    target_type: PageType::Committee,
                    target_key: "committee_id".to_string(),
                    direction: LookupDirection::Ancestors,
                    transform: functions::id_list(),
                }),
        )
    }

    struct Harness {
        worker: ProcessWorker,
        process_queue: Arc<WorkQueue<NodeId>>,
        load_queue: Arc<WorkQueue<LoaderRecord>>,
    }

    fn create_harness(max_lookup_attempts: u32) -> Harness {
        let ctx = WorkerContext {
            graph: Graph::new("test").into_shared(),
            registry: Arc::new(create_test_registry()),
            known_links: Default::default(),
            strict: false,
        };
        let process_queue = Arc::new(WorkQueue::new("process", Discipline::Fifo));
        let load_queue = Arc::new(WorkQueue::new("load", Discipline::Fifo));
        let worker = ProcessWorker::new(
            ctx,
            Arc::clone(&process_queue),
            Arc::clone(&load_queue),
            Duration::from_millis(1),
            max_lookup_attempts,
        );
        Harness {
            worker,
            process_queue,
            load_queue,
        }
    }

    /// Committee root with a bill child carrying fetched HTML
    fn build_graph(harness: &Harness, committee_state: PipelineState) -> (NodeId, NodeId) {
        let mut graph = write_graph(&harness.worker.ctx.graph);

        let mut committee_data = NodeData::new();
        committee_data.insert("committee_id".to_string(), json!(7));
        let committee = graph.add_node(
            "https://example.gov/Committees/Detail?id=1",
            PageType::Committee,
            &[],
            Some(committee_data),
            Some(committee_state),
        );

        let mut bill_data = NodeData::new();
        bill_data.insert(HTML_KEY.to_string(), json!(BILL_HTML));
        bill_data.insert(SESSION_KEY.to_string(), json!("103"));
        let bill = graph.add_node(
            "https://example.gov/Bills/Detail?id=5",
            PageType::Bill,
            &[committee],
            Some(bill_data),
            Some(PipelineState::AwaitingProcessing),
        );
        (committee, bill)
    }

    async fn pop_record(queue: &WorkQueue<LoaderRecord>) -> LoaderRecord {
        match queue.pop(Duration::from_millis(10)).await {
            Some(Message::Item(record)) => record,
            _ => panic!("expected a loader record"),
        }
    }

    #[tokio::test]
    async fn test_reference_resolves_to_loaded_id() {
        let mut harness = create_harness(5);
        let (_, bill) = build_graph(&harness, PipelineState::Completed);

        let disposition = harness.worker.process(bill).await.unwrap();
        assert_eq!(disposition, Disposition::Forwarded);

        let record = pop_record(&harness.load_queue).await;
        assert_eq!(record.node_id, bill);
        assert_eq!(record.params["committee_id"], json!([7]));
        assert_eq!(record.params["number"], json!("HB 5"));
        assert_eq!(record.params["session"], json!("103"));
        assert_eq!(
            record.params["url"],
            json!("https://example.gov/Bills/Detail?id=5")
        );

        let graph = read_graph(&harness.worker.ctx.graph);
        let node = graph.get(bill).unwrap();
        assert_eq!(node.state, PipelineState::AwaitingLoad);
        assert!(!node.data.contains_key(HTML_KEY));
    }

    #[tokio::test]
    async fn test_unsettled_reference_requeues() {
        let mut harness = create_harness(5);
        let (_, bill) = build_graph(&harness, PipelineState::AwaitingLoad);

        let disposition = harness.worker.process(bill).await.unwrap();
        assert_eq!(disposition, Disposition::Requeued);

        assert!(harness.load_queue.is_empty());
        assert_eq!(
            harness.process_queue.pop(Duration::from_millis(10)).await,
            Some(Message::Item(bill))
        );
        let graph = read_graph(&harness.worker.ctx.graph);
        assert_eq!(
            graph.get(bill).unwrap().state,
            PipelineState::AwaitingProcessing
        );
    }

    #[tokio::test]
    async fn test_lookup_attempts_are_bounded() {
        let mut harness = create_harness(1);
        let (_, bill) = build_graph(&harness, PipelineState::AwaitingLoad);

        // First pass waits, second pass gives up on the reference
        harness.worker.process(bill).await.unwrap();
        harness.worker.process(bill).await.unwrap();

        let record = pop_record(&harness.load_queue).await;
        assert!(!record.params.contains_key("committee_id"));
        assert_eq!(record.params["number"], json!("HB 5"));
    }

    #[tokio::test]
    async fn test_missing_html_is_an_error() {
        let mut harness = create_harness(5);
        let id = write_graph(&harness.worker.ctx.graph).add_node(
            "https://example.gov/Bills/Detail?id=6",
            PageType::Bill,
            &[],
            None,
            Some(PipelineState::AwaitingProcessing),
        );

        let result = harness.worker.process(id).await;
        assert!(matches!(result, Err(StatehouseError::EmptyResult { .. })));
    }

    #[tokio::test]
    async fn test_page_without_content_is_an_error() {
        let mut harness = create_harness(5);
        let mut data = NodeData::new();
        data.insert(HTML_KEY.to_string(), json!("<p>Nothing here</p>"));
        let id = write_graph(&harness.worker.ctx.graph).add_node(
            "https://example.gov/Bills/Detail?id=7",
            PageType::Bill,
            &[],
            Some(data),
            Some(PipelineState::AwaitingProcessing),
        );

        let result = harness.worker.process(id).await;
        assert!(matches!(result, Err(StatehouseError::EmptyResult { .. })));
    }
}
