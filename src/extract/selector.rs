use scraper::Html;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Callable selector; returns `Ok(None)` when there is nothing to extract
pub type SelectorFn = Arc<dyn Fn(&Html) -> Result<Option<Value>, String> + Send + Sync>;

/// How a single template key is extracted from a document
#[derive(Clone)]
pub enum FieldSelector {
    /// Trimmed text of every element matching the CSS query
    Text { query: String },

    /// The named attribute of every element matching the CSS query
    Attr { query: String, attr: String },

    /// Arbitrary extraction over the parsed document
    Func(SelectorFn),
}

impl FieldSelector {
    pub fn text(query: impl Into<String>) -> Self {
        Self::Text {
            query: query.into(),
        }
    }

    pub fn attr(query: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::Attr {
            query: query.into(),
            attr: attr.into(),
        }
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Html) -> Result<Option<Value>, String> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }
}

impl fmt::Debug for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { query } => f.debug_struct("Text").field("query", query).finish(),
            Self::Attr { query, attr } => f
                .debug_struct("Attr")
                .field("query", query)
                .field("attr", attr)
                .finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Ordered list of keys and the selectors that fill them
#[derive(Debug, Clone, Default)]
pub struct ExtractTemplate {
    fields: Vec<(String, FieldSelector)>,
}

impl ExtractTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field to the template
    pub fn field(mut self, key: impl Into<String>, selector: FieldSelector) -> Self {
        self.fields.push((key.into(), selector));
        self
    }

    pub fn fields(&self) -> &[(String, FieldSelector)] {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
