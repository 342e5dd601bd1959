//! Checkpoint persistence for the link graph
//!
//! A checkpoint is a JSON document listing every node with its edges, so a
//! crawl interrupted at any point can be rehydrated. The known-links cache is
//! a separate flat list of URLs that finished the pipeline in earlier runs.

use super::node::{Node, NodeData, NodeId, HTML_KEY};
use super::Graph;
use crate::registry::PageType;
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while reading or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate node id {0} in checkpoint")]
    DuplicateId(NodeId),

    #[error("Node id {0} in checkpoint leaves no room for new ids")]
    IdOverflow(NodeId),
}

/// Serialized form of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub nodes: Vec<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<NodeId>>,
}

/// Serialized form of one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(default)]
    pub outgoing_ids: Vec<NodeId>,
    #[serde(default)]
    pub incoming_ids: Vec<NodeId>,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub url: String,
    #[serde(default)]
    pub data: NodeData,
    pub state: PipelineState,
}

impl Graph {
    /// Snapshots the graph, dropping transient HTML payloads
    pub fn to_checkpoint(&self) -> Checkpoint {
        let nodes = self
            .nodes
            .values()
            .map(|node| {
                let mut data = node.data.clone();
                data.remove(HTML_KEY);
                NodeRecord {
                    id: node.id,
                    outgoing_ids: node.outgoing.iter().copied().collect(),
                    incoming_ids: node.incoming.iter().copied().collect(),
                    page_type: node.page_type,
                    url: node.url.clone(),
                    data,
                    state: node.state,
                }
            })
            .collect();

        Checkpoint {
            name: self.name.clone(),
            nodes,
            roots: Some(self.roots.iter().copied().collect()),
        }
    }

    /// Rebuilds a graph from a checkpoint
    ///
    /// Nodes are created first and edges wired in a second pass, ignoring
    /// ids that are not part of the checkpoint. The id counter resumes past
    /// the largest loaded id.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if two records share an id, and `IdOverflow` if
    /// an id is the largest representable one.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self, CheckpointError> {
        let mut graph = Graph::new(checkpoint.name);
        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();

        for record in checkpoint.nodes {
            if graph.nodes.contains_key(&record.id) {
                return Err(CheckpointError::DuplicateId(record.id));
            }

            if let Some(previous) = graph.by_url.get(&record.url).copied() {
                warn!(id = previous, url = %record.url, "Duplicate URL in checkpoint, keeping the later node");
                graph.nodes.remove(&previous);
            }

            edges.extend(record.outgoing_ids.iter().map(|to| (record.id, *to)));
            edges.extend(record.incoming_ids.iter().map(|from| (*from, record.id)));

            let after = record
                .id
                .checked_add(1)
                .ok_or(CheckpointError::IdOverflow(record.id))?;
            graph.next_id = graph.next_id.max(after);
            graph.by_url.insert(record.url.clone(), record.id);
            graph.nodes.insert(
                record.id,
                Node::new(record.id, record.url, record.page_type, record.state, record.data),
            );
        }

        for (from, to) in edges {
            graph.link(from, to);
        }

        graph.roots = match checkpoint.roots {
            Some(roots) => roots
                .into_iter()
                .filter(|id| graph.nodes.contains_key(id))
                .collect(),
            None => graph
                .nodes
                .values()
                .filter(|node| node.incoming.is_empty())
                .map(|node| node.id)
                .collect::<BTreeSet<_>>(),
        };

        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        Ok(serde_json::to_string_pretty(&self.to_checkpoint())?)
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint = serde_json::from_str(json)?;
        Self::from_checkpoint(checkpoint)
    }

    /// Writes the checkpoint atomically (temporary file, then rename)
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        write_atomic(path, &self.to_json()?)?;
        debug!(path = %path.display(), nodes = self.len(), "Saved checkpoint");
        Ok(())
    }

    /// Loads a checkpoint file
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let content = fs::read_to_string(path)?;
        let graph = Self::from_json(&content)?;
        info!(path = %path.display(), nodes = graph.len(), "Loaded checkpoint");
        Ok(graph)
    }
}

/// Loads the known-links cache, returning an empty set if the file does not exist
pub fn load_known_links(path: &Path) -> Result<HashSet<String>, CheckpointError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = fs::read_to_string(path)?;
    let links: Vec<String> = serde_json::from_str(&content)?;
    Ok(links.into_iter().collect())
}

/// Saves the known-links cache as a sorted JSON array
pub fn save_known_links(path: &Path, links: &HashSet<String>) -> Result<(), CheckpointError> {
    let mut sorted: Vec<&String> = links.iter().collect();
    sorted.sort();
    write_atomic(path, &serde_json::to_string_pretty(&sorted)?)
}

fn write_atomic(path: &Path, content: &str) -> Result<(), CheckpointError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SESSION_KEY;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_graph() -> Graph {
        let mut graph = Graph::new("legislature");
        let mut data = NodeData::new();
        data.insert(SESSION_KEY.to_string(), json!("103"));
        data.insert(HTML_KEY.to_string(), json!("<html></html>"));

        let list = graph.add_node(
            "https://example.com/Committees",
            PageType::CommitteeList,
            &[],
            Some(data.clone()),
            Some(PipelineState::Completed),
        );
        let mut committee_data = data;
        committee_data.insert("committee_id".to_string(), json!(7));
        committee_data.insert("name".to_string(), json!("Revenue"));
        let committee = graph.add_node(
            "https://example.com/Committees/Detail?id=1",
            PageType::Committee,
            &[list],
            Some(committee_data),
            Some(PipelineState::AwaitingLoad),
        );
        graph.add_node(
            "https://example.com/Bills/Detail?id=5",
            PageType::Bill,
            &[committee],
            None,
            Some(PipelineState::AwaitingFetch),
        );
        graph
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let graph = create_test_graph();
        let restored = Graph::from_json(&graph.to_json().unwrap()).unwrap();

        assert_eq!(restored.name(), "legislature");
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.roots(), graph.roots());
        for node in graph.nodes() {
            let other = restored.get(node.id).unwrap();
            assert_eq!(other.url, node.url);
            assert_eq!(other.state, node.state);
            assert_eq!(other.incoming, node.incoming);
            assert_eq!(other.outgoing, node.outgoing);

            let mut expected = node.data.clone();
            expected.remove(HTML_KEY);
            assert_eq!(other.data, expected);
        }

        let committee = restored
            .find_by_url("https://example.com/Committees/Detail?id=1")
            .unwrap();
        assert_eq!(restored.get(committee).unwrap().data["committee_id"], json!(7));
    }

    #[test]
    fn test_html_is_stripped() {
        let graph = create_test_graph();
        let checkpoint = graph.to_checkpoint();
        assert!(checkpoint
            .nodes
            .iter()
            .all(|record| !record.data.contains_key(HTML_KEY)));
        assert_eq!(checkpoint.nodes[0].data.get(SESSION_KEY), Some(&json!("103")));
    }

    #[test]
    fn test_counter_exceeds_loaded_ids() {
        let json = r#"{
            "name": "legislature",
            "nodes": [
                {"id": 3, "outgoing_ids": [17], "incoming_ids": [], "type": "BILL_LIST",
                 "url": "https://example.com/Bills", "data": {}, "state": "completed"},
                {"id": 17, "outgoing_ids": [], "incoming_ids": [3], "type": "BILL",
                 "url": "https://example.com/Bills/Detail?id=1", "data": {}, "state": "awaiting_fetch"}
            ]
        }"#;

        let mut graph = Graph::from_json(json).unwrap();
        assert_eq!(graph.next_id(), 18);
        assert!(graph.roots().contains(&3));
        assert!(graph.get(3).unwrap().outgoing.contains(&17));

        let id = graph.add_node("https://example.com/Votes/Detail?id=1", PageType::Vote, &[17], None, None);
        assert!(id > 17);
    }

    #[test]
    fn test_largest_id_is_rejected() {
        let json = r#"{
            "name": "g",
            "nodes": [
                {"id": 18446744073709551615, "type": "BILL",
                 "url": "https://example.com/a", "state": "created"}
            ]
        }"#;

        assert!(matches!(
            Graph::from_json(json),
            Err(CheckpointError::IdOverflow(u64::MAX))
        ));
    }

    #[test]
    fn test_edges_are_symmetrized_on_load() {
        let json = r#"{
            "name": "g",
            "nodes": [
                {"id": 1, "outgoing_ids": [2], "type": "COMMITTEE_LIST",
                 "url": "https://example.com/Committees", "state": "completed"},
                {"id": 2, "outgoing_ids": [99], "type": "COMMITTEE",
                 "url": "https://example.com/Committees/Detail?id=1", "state": "created"}
            ]
        }"#;

        let graph = Graph::from_json(json).unwrap();
        assert!(graph.get(2).unwrap().incoming.contains(&1));
        assert!(graph.get(2).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let json = r#"{
            "name": "g",
            "nodes": [
                {"id": 1, "type": "BILL", "url": "https://example.com/a", "state": "created"},
                {"id": 1, "type": "BILL", "url": "https://example.com/b", "state": "created"}
            ]
        }"#;

        assert!(matches!(
            Graph::from_json(json),
            Err(CheckpointError::DuplicateId(1))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let graph = create_test_graph();
        graph.save(&path).unwrap();
        assert!(!dir.path().join("checkpoint.json.tmp").exists());

        let restored = Graph::load(&path).unwrap();
        assert_eq!(restored.len(), graph.len());
    }

    #[test]
    fn test_known_links_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known.json");

        assert!(load_known_links(&path).unwrap().is_empty());

        let links: HashSet<String> = ["https://example.com/b", "https://example.com/a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        save_known_links(&path, &links).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.find("/a").unwrap() < content.find("/b").unwrap());
        assert_eq!(load_known_links(&path).unwrap(), links);
    }
}
