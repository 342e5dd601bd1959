use super::{Disposition, StageWorker, WorkerContext};
use crate::graph::{write_graph, NodeId};
use crate::registry::{PageType, Stage};
use crate::state::PipelineState;
use crate::storage::SqliteStore;
use crate::{Result, StatehouseError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Transformed content handed from the process stage to the load stage
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderRecord {
    pub node_id: NodeId,
    pub page_type: PageType,
    /// Transformed fields plus `url` and `session`
    pub params: Map<String, Value>,
}

/// Upserts records and completes their nodes
///
/// The worker owns its SQLite connection; loads run one at a time, each in
/// its own transaction.
pub struct LoadWorker {
    ctx: WorkerContext,
    store: SqliteStore,
}

impl LoadWorker {
    pub fn new(ctx: WorkerContext, store: SqliteStore) -> Self {
        Self { ctx, store }
    }
}

#[async_trait]
impl StageWorker for LoadWorker {
    type Item = LoaderRecord;

    fn stage(&self) -> Stage {
        Stage::Load
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn node_of(item: &LoaderRecord) -> NodeId {
        item.node_id
    }

    async fn process(&mut self, record: LoaderRecord) -> Result<Disposition> {
        let id = record.node_id;
        {
            let mut graph = write_graph(&self.ctx.graph);
            let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
            node.advance(PipelineState::Loading)?;
        }

        let spec = self
            .ctx
            .registry
            .load_spec(record.page_type)
            .copied()
            .ok_or(StatehouseError::MissingTemplate {
                page_type: record.page_type,
                stage: Stage::Load,
            })?;

        let row_id = self.store.load_in_transaction(spec.load, &record.params)?;

        let url = {
            let mut graph = write_graph(&self.ctx.graph);
            let node = graph.get_mut(id).ok_or(StatehouseError::NodeNotFound(id))?;
            node.data.insert(spec.id_key.to_string(), json!(row_id));
            node.advance(PipelineState::Completed)?;
            let url = node.url.clone();
            graph.prune_settled(id);
            url
        };
        self.ctx.remember(&url);

        debug!(node = id, url = %url, page_type = %record.page_type, row_id, "Loaded record");
        Ok(Disposition::Completed)
    }
}
