use super::selector::{ExtractTemplate, FieldSelector, SelectorFn};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Extraction failures; raised only in strict mode
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector for '{key}': {query}")]
    InvalidSelector { key: String, query: String },

    #[error("No element matched '{query}' for '{key}'")]
    NoMatch { key: String, query: String },

    #[error("Element matching '{query}' has no '{attr}' attribute (key '{key}')")]
    MissingAttribute {
        key: String,
        query: String,
        attr: String,
    },

    #[error("Selector function for '{key}' failed: {message}")]
    Function { key: String, message: String },
}

/// Applies extraction templates to documents
///
/// In lenient mode every template key appears in the result, with `null`
/// standing in for anything that could not be extracted. In strict mode the
/// first problem is returned as an error instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    strict: bool,
}

impl Extractor {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parses the markup and extracts every template key
    pub fn extract(
        &self,
        template: &ExtractTemplate,
        markup: &str,
    ) -> Result<Map<String, Value>, ExtractError> {
        let document = Html::parse_document(markup);
        self.extract_document(template, &document)
    }

    /// Extracts every template key from an already parsed document
    pub fn extract_document(
        &self,
        template: &ExtractTemplate,
        document: &Html,
    ) -> Result<Map<String, Value>, ExtractError> {
        let mut values = Map::new();

        for (key, selector) in template.fields() {
            let value = match selector {
                FieldSelector::Text { query } => self.select_text(key, query, document)?,
                FieldSelector::Attr { query, attr } => {
                    self.select_attr(key, query, attr, document)?
                }
                FieldSelector::Func(func) => self.call(key, func, document)?,
            };
            values.insert(key.clone(), value);
        }

        Ok(values)
    }

    fn parse_selector(&self, key: &str, query: &str) -> Result<Option<Selector>, ExtractError> {
        match Selector::parse(query) {
            Ok(selector) => Ok(Some(selector)),
            Err(_) if self.strict => Err(ExtractError::InvalidSelector {
                key: key.to_string(),
                query: query.to_string(),
            }),
            Err(_) => {
                warn!(key, query, "Invalid selector");
                Ok(None)
            }
        }
    }

    fn no_match(&self, key: &str, query: &str) -> Result<Value, ExtractError> {
        if self.strict {
            return Err(ExtractError::NoMatch {
                key: key.to_string(),
                query: query.to_string(),
            });
        }
        warn!(key, query, "Selector matched nothing");
        Ok(Value::Null)
    }

    fn select_text(&self, key: &str, query: &str, document: &Html) -> Result<Value, ExtractError> {
        let Some(selector) = self.parse_selector(key, query)? else {
            return Ok(Value::Null);
        };

        let texts: Vec<Value> = document
            .select(&selector)
            .map(|element| Value::String(element.text().collect::<String>().trim().to_string()))
            .collect();

        if texts.is_empty() {
            return self.no_match(key, query);
        }
        Ok(Value::Array(texts))
    }

    fn select_attr(
        &self,
        key: &str,
        query: &str,
        attr: &str,
        document: &Html,
    ) -> Result<Value, ExtractError> {
        let Some(selector) = self.parse_selector(key, query)? else {
            return Ok(Value::Null);
        };

        let mut matched = false;
        let mut values = Vec::new();
        for element in document.select(&selector) {
            matched = true;
            match element.value().attr(attr) {
                Some(value) => values.push(Value::String(value.trim().to_string())),
                None if self.strict => {
                    return Err(ExtractError::MissingAttribute {
                        key: key.to_string(),
                        query: query.to_string(),
                        attr: attr.to_string(),
                    })
                }
                None => debug!(key, query, attr, "Element without attribute skipped"),
            }
        }

        if !matched {
            return self.no_match(key, query);
        }
        if values.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::Array(values))
    }

    fn call(&self, key: &str, func: &SelectorFn, document: &Html) -> Result<Value, ExtractError> {
        match func(document) {
            Ok(Some(value @ (Value::Array(_) | Value::Object(_)))) => Ok(value),
            Ok(Some(Value::Null)) | Ok(None) => Ok(Value::Null),
            Ok(Some(scalar)) => Ok(Value::Array(vec![scalar])),
            Err(message) if self.strict => Err(ExtractError::Function {
                key: key.to_string(),
                message,
            }),
            Err(message) => {
                warn!(key, error = %message, "Selector function failed");
                Ok(Value::Null)
            }
        }
    }
}
