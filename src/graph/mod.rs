//! Link graph module
//!
//! The graph is the crawl's shared memory: every discovered page is a node
//! keyed by its normalized URL, carrying its pipeline state and an open data
//! map. Nodes live in an id-ordered arena and edges are id sets, so
//! traversals never hold references into the graph.
//!
//! # Components
//!
//! - `Node`: a page with its state, edges and data
//! - `NodeQuery`: attribute and data constraints for graph-wide lookups
//! - `Checkpoint`: the serialized form used for resuming a crawl

mod checkpoint;
mod node;
mod query;

pub use checkpoint::{
    load_known_links, save_known_links, Checkpoint, CheckpointError, NodeRecord,
};
pub use node::{Node, NodeData, NodeId, HTML_KEY, SESSION_KEY};
pub use query::{NodeAttr, NodeQuery};

use crate::registry::PageType;
use crate::state::PipelineState;
use crate::url::normalize_url;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Graph shared between the coordinator and the stage workers
///
/// The lock is a std lock and must never be held across an `.await`.
pub type SharedGraph = Arc<RwLock<Graph>>;

/// Takes the shared read lock, recovering the graph if a holder panicked
pub fn read_graph(graph: &SharedGraph) -> RwLockReadGuard<'_, Graph> {
    graph.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Takes the exclusive write lock, recovering the graph if a holder panicked
pub fn write_graph(graph: &SharedGraph) -> RwLockWriteGuard<'_, Graph> {
    graph.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Incoming,
    Outgoing,
}

/// Directed graph of crawled pages
#[derive(Debug, Default)]
pub struct Graph {
    name: String,
    nodes: BTreeMap<NodeId, Node>,
    by_url: HashMap<String, NodeId>,
    roots: BTreeSet<NodeId>,
    next_id: NodeId,
}

impl Graph {
    /// Creates an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Wraps the graph for sharing between tasks
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id the next inserted node will receive
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Iterates over all nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// The crawl origins currently in the graph
    pub fn roots(&self) -> &BTreeSet<NodeId> {
        &self.roots
    }

    /// Adds a page to the graph
    ///
    /// Edges are wired from every known id in `incoming`; unknown ids are
    /// ignored. A node created without incoming references becomes a root.
    /// If a node with the same URL already exists it is deleted first, so the
    /// last writer wins.
    ///
    /// # Arguments
    ///
    /// * `url` - Page URL, normalized when it parses
    /// * `page_type` - Page type selecting the node's templates
    /// * `incoming` - Ids of the pages that reference this one
    /// * `data` - Initial data map
    /// * `state` - Initial state, `Created` when omitted
    ///
    /// # Returns
    ///
    /// The id assigned to the new node
    pub fn add_node(
        &mut self,
        url: &str,
        page_type: PageType,
        incoming: &[NodeId],
        data: Option<NodeData>,
        state: Option<PipelineState>,
    ) -> NodeId {
        let url = canonical_url(url);

        if let Some(previous) = self.by_url.get(&url).copied() {
            debug!(id = previous, url = %url, "Replacing existing node");
            self.delete_node(previous);
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut node = Node::new(
            id,
            url.clone(),
            page_type,
            state.unwrap_or(PipelineState::Created),
            data.unwrap_or_default(),
        );

        for parent_id in incoming {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.outgoing.insert(id);
                node.incoming.insert(*parent_id);
            }
        }

        if node.incoming.is_empty() {
            self.roots.insert(id);
        }

        trace!(id, url = %url, page_type = %page_type, "Added node");
        self.by_url.insert(url, id);
        self.nodes.insert(id, node);
        id
    }

    /// Wires an edge between two known nodes
    ///
    /// Returns false if either node is missing or both ids are the same.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> bool {
        if from == to || !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return false;
        }

        if let Some(parent) = self.nodes.get_mut(&from) {
            parent.outgoing.insert(to);
        }
        if let Some(child) = self.nodes.get_mut(&to) {
            child.incoming.insert(from);
        }
        true
    }

    /// Finds a node by exact URL
    pub fn find_by_url(&self, url: &str) -> Option<NodeId> {
        self.by_url.get(&canonical_url(url)).copied()
    }

    /// Finds the first node, in id order, satisfying the query
    pub fn find_matching(&self, query: &NodeQuery) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| query.matches(node))
            .map(|node| node.id)
    }

    /// Searches the nodes reachable along incoming edges
    ///
    /// The start node itself is not a candidate.
    pub fn search_ancestors<F>(&self, start: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.search(start, Direction::Incoming, predicate)
    }

    /// Searches the nodes reachable along outgoing edges
    ///
    /// The start node itself is not a candidate.
    pub fn search_descendants<F>(&self, start: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.search(start, Direction::Outgoing, predicate)
    }

    /// Returns every node reachable from `start` along outgoing edges
    pub fn descendants(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.neighbours(start, Direction::Outgoing);

        while let Some(id) = stack.pop() {
            if id == start || !seen.insert(id) {
                continue;
            }
            stack.extend(self.neighbours(id, Direction::Outgoing));
        }

        seen
    }

    fn search<F>(&self, start: NodeId, direction: Direction, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        let mut visited = HashSet::from([start]);
        let mut stack = self.neighbours(start, direction);

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if predicate(node) {
                return Some(id);
            }
            stack.extend(self.neighbours(id, direction));
        }

        None
    }

    fn neighbours(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| match direction {
                Direction::Incoming => node.incoming.iter().rev().copied().collect(),
                Direction::Outgoing => node.outgoing.iter().rev().copied().collect(),
            })
            .unwrap_or_default()
    }

    /// Removes a node and unlinks it from its neighbours
    ///
    /// Deleting an unknown id is a no-op.
    pub fn delete_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;

        for parent in &node.incoming {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.outgoing.remove(&id);
            }
        }
        for child in &node.outgoing {
            if let Some(child) = self.nodes.get_mut(child) {
                child.incoming.remove(&id);
            }
        }

        if self.by_url.get(&node.url) == Some(&id) {
            self.by_url.remove(&node.url);
        }
        self.roots.remove(&id);
        Some(node)
    }

    /// Removes every node without incoming or outgoing edges
    ///
    /// # Returns
    ///
    /// The number of nodes removed
    pub fn cleanup(&mut self) -> usize {
        let orphans: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.incoming.is_empty() && node.outgoing.is_empty())
            .map(|node| node.id)
            .collect();

        for id in &orphans {
            self.delete_node(*id);
        }
        orphans.len()
    }

    /// True if the node and everything reachable from it is settled
    pub fn subtree_settled(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) if node.is_settled() => self
                .descendants(id)
                .iter()
                .all(|child| self.nodes.get(child).map_or(true, Node::is_settled)),
            _ => false,
        }
    }

    /// Prunes a settled subtree and climbs to parents that became settled
    ///
    /// Nothing is removed unless the node and all of its descendants are
    /// Completed or Error. After removal each former parent is offered to
    /// pruning in turn. Pruning an already removed node is a no-op.
    ///
    /// # Returns
    ///
    /// The ids of all removed nodes
    pub fn prune_settled(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut pending = vec![id];

        while let Some(candidate) = pending.pop() {
            if !self.subtree_settled(candidate) {
                continue;
            }

            let parents: Vec<NodeId> = self
                .nodes
                .get(&candidate)
                .map(|node| node.incoming.iter().copied().collect())
                .unwrap_or_default();

            let mut subtree: Vec<NodeId> = self.descendants(candidate).into_iter().collect();
            subtree.push(candidate);
            for node_id in subtree {
                if self.delete_node(node_id).is_some() {
                    removed.push(node_id);
                }
            }

            pending.extend(parents.into_iter().filter(|p| self.nodes.contains_key(p)));
        }

        if !removed.is_empty() {
            debug!(start = id, count = removed.len(), "Pruned settled nodes");
        }
        removed
    }

    /// Ids of all nodes that still need work, in id order
    pub fn unsettled(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| !node.is_settled())
            .map(|node| node.id)
            .collect()
    }

    /// Number of nodes in each pipeline state
    pub fn state_counts(&self) -> BTreeMap<PipelineState, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.state).or_insert(0) += 1;
        }
        counts
    }
}

/// Normalizes a URL for use as a graph key, keeping it verbatim if it does not parse
fn canonical_url(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}
