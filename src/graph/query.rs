use super::node::Node;
use crate::url::{looks_like_url, urls_match};
use serde_json::{json, Value};

/// Node attributes a query can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAttr {
    Id,
    Url,
    PageType,
    State,
}

/// Constraints for a graph-wide node lookup
///
/// A constraint with an expected value of `None` only requires the key to be
/// present. String values that look like URLs compare by normalized path and
/// query, and a scalar expectation matches any member of a list value.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    data: Vec<(String, Option<Value>)>,
    attrs: Vec<(NodeAttr, Option<Value>)>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint on a key of the node's data map
    pub fn with_data(mut self, key: impl Into<String>, expected: Option<Value>) -> Self {
        self.data.push((key.into(), expected));
        self
    }

    /// Adds a constraint on one of the node's attributes
    pub fn with_attr(mut self, attr: NodeAttr, expected: Option<Value>) -> Self {
        self.attrs.push((attr, expected));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.attrs.is_empty()
    }

    /// Checks whether a node satisfies every constraint
    pub fn matches(&self, node: &Node) -> bool {
        let data_ok = self.data.iter().all(|(key, expected)| {
            match (node.data.get(key), expected) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => value_matches(actual, expected),
            }
        });

        data_ok
            && self.attrs.iter().all(|(attr, expected)| match expected {
                None => true,
                Some(expected) => value_matches(&attr_value(node, *attr), expected),
            })
    }
}

fn attr_value(node: &Node, attr: NodeAttr) -> Value {
    match attr {
        NodeAttr::Id => json!(node.id),
        NodeAttr::Url => json!(node.url),
        NodeAttr::PageType => json!(node.page_type.as_str()),
        NodeAttr::State => json!(node.state.to_db_string()),
    }
}

/// Compares an actual value against an expected one
pub(crate) fn value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => {
            if looks_like_url(a) && looks_like_url(e) {
                urls_match(a, e)
            } else {
                a == e
            }
        }
        (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
        (Value::Array(items), e) if !e.is_array() => {
            items.iter().any(|item| value_matches(item, e))
        }
        (a, e) => a == e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeData;
    use crate::registry::PageType;
    use crate::state::PipelineState;

    fn create_test_node() -> Node {
        let mut data = NodeData::new();
        data.insert("committee_id".to_string(), json!(12));
        data.insert(
            "sponsor_urls".to_string(),
            json!(["https://example.com/Members/Detail?id=3", "/Members/Detail?id=4"]),
        );
        Node::new(
            5,
            "https://example.com/Committees/Detail?id=9".to_string(),
            PageType::Committee,
            PipelineState::Completed,
            data,
        )
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(NodeQuery::new().matches(&create_test_node()));
    }

    #[test]
    fn test_key_presence() {
        let node = create_test_node();
        assert!(NodeQuery::new().with_data("committee_id", None).matches(&node));
        assert!(!NodeQuery::new().with_data("bill_id", None).matches(&node));
    }

    #[test]
    fn test_data_value() {
        let node = create_test_node();
        assert!(NodeQuery::new()
            .with_data("committee_id", Some(json!(12)))
            .matches(&node));
        assert!(!NodeQuery::new()
            .with_data("committee_id", Some(json!(13)))
            .matches(&node));
    }

    #[test]
    fn test_url_attribute_matches_relative_form() {
        let node = create_test_node();
        let query = NodeQuery::new()
            .with_attr(NodeAttr::Url, Some(json!("/committees/detail?id=9")))
            .with_attr(NodeAttr::PageType, Some(json!("COMMITTEE")));
        assert!(query.matches(&node));

        let query = NodeQuery::new().with_attr(NodeAttr::PageType, Some(json!("BILL")));
        assert!(!query.matches(&node));
    }

    #[test]
    fn test_scalar_matches_list_member() {
        let node = create_test_node();
        let query = NodeQuery::new()
            .with_data("sponsor_urls", Some(json!("https://other.example.com/Members/Detail?id=4")));
        assert!(query.matches(&node));
    }

    #[test]
    fn test_state_and_id_attributes() {
        let node = create_test_node();
        let query = NodeQuery::new()
            .with_attr(NodeAttr::State, Some(json!("completed")))
            .with_attr(NodeAttr::Id, Some(json!(5)));
        assert!(query.matches(&node));
    }
}
