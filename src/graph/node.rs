use crate::registry::PageType;
use crate::state::PipelineState;
use crate::{Result, StatehouseError};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Identifier assigned by the owning graph's counter
pub type NodeId = u64;

/// Open key/value payload carried by a node
pub type NodeData = Map<String, Value>;

/// Data key holding the fetched HTML between the Fetch and Process stages
pub const HTML_KEY: &str = "html";

/// Data key holding the crawl session label inherited from the root
pub const SESSION_KEY: &str = "session";

/// A page in the link graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub url: String,
    pub page_type: PageType,
    pub state: PipelineState,
    pub incoming: BTreeSet<NodeId>,
    pub outgoing: BTreeSet<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        url: String,
        page_type: PageType,
        state: PipelineState,
        data: NodeData,
    ) -> Self {
        Self {
            id,
            url,
            page_type,
            state,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            data,
        }
    }

    /// Moves the node one step forward in the pipeline
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` is not a legal successor of the
    /// current state.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(StatehouseError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Marks the node as failed
    pub fn fail(&mut self) {
        self.state = PipelineState::Error;
    }

    /// Returns the node to the Fetch stage (resume and retry)
    pub fn reschedule(&mut self) {
        self.state = PipelineState::AwaitingFetch;
    }

    /// Crawl session the node belongs to, if any
    pub fn session(&self) -> Option<&str> {
        self.data.get(SESSION_KEY).and_then(Value::as_str)
    }

    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }
}
