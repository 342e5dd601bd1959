use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Per-key transform function
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, FieldError> + Send + Sync>;

/// Failure of a single transform function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The value has an unexpected shape or content; recoverable
    #[error("malformed value: {0}")]
    Malformed(String),

    /// The transform cannot continue at all; always propagated
    #[error("fatal transform failure: {0}")]
    Fatal(String),
}

/// Errors returned by the transformer
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No transform registered for key '{0}'")]
    UnknownKey(String),

    #[error("Transform of '{key}' failed: {source}")]
    Field {
        key: String,
        #[source]
        source: FieldError,
    },
}

/// Mapping from extracted keys to the functions that transform them
#[derive(Clone, Default)]
pub struct TransformTemplate {
    fields: Vec<(String, TransformFn)>,
}

impl TransformTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, transform: TransformFn) -> Self {
        self.push(key, transform);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, transform: TransformFn) {
        let key = key.into();
        self.fields.retain(|(existing, _)| *existing != key);
        self.fields.push((key, transform));
    }

    pub fn get(&self, key: &str) -> Option<&TransformFn> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, transform)| transform)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for TransformTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Result of transforming one content map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutcome {
    pub values: Map<String, Value>,
    /// Keys whose transform reported malformed data and were skipped
    pub failed_keys: Vec<String>,
}

/// Applies transform templates to extracted content
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer {
    strict: bool,
}

impl Transformer {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Transforms every non-null value of `content`
    ///
    /// String values are HTML-entity-decoded before the call. A transform
    /// returning an object has its entries merged into the output; any other
    /// result is stored under the original key.
    ///
    /// # Errors
    ///
    /// * `UnknownKey` - a content key has no transform (always)
    /// * `Field` with `Fatal` - always
    /// * `Field` with `Malformed` - strict mode only; otherwise the key is
    ///   recorded in `failed_keys`
    pub fn transform(
        &self,
        template: &TransformTemplate,
        content: &Map<String, Value>,
    ) -> Result<TransformOutcome, TransformError> {
        let mut outcome = TransformOutcome::default();

        for (key, value) in content {
            if value.is_null() {
                continue;
            }

            let transform = template
                .get(key)
                .ok_or_else(|| TransformError::UnknownKey(key.clone()))?;

            match transform(&unescape_entities(value)) {
                Ok(Value::Object(fields)) => outcome.values.extend(fields),
                Ok(result) => {
                    outcome.values.insert(key.clone(), result);
                }
                Err(FieldError::Malformed(message)) if !self.strict => {
                    warn!(key = %key, error = %message, "Skipping malformed value");
                    outcome.failed_keys.push(key.clone());
                }
                Err(source) => {
                    return Err(TransformError::Field {
                        key: key.clone(),
                        source,
                    })
                }
            }
        }

        Ok(outcome)
    }
}

/// Decodes HTML entities in every string of a value
pub fn unescape_entities(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(decode_entities(s)),
        Value::Array(items) => Value::Array(items.iter().map(unescape_entities).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unescape_entities(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper() -> TransformFn {
        Arc::new(|value: &Value| match value.as_str() {
            Some(s) => Ok(json!(s.to_uppercase())),
            None => Err(FieldError::Malformed("expected a string".to_string())),
        })
    }

    fn create_test_template() -> TransformTemplate {
        TransformTemplate::new()
            .field("name", upper())
            .field(
                "split",
                Arc::new(|_: &Value| Ok(json!({"first": "Jane", "last": "Doe"}))),
            )
            .field(
                "fatal",
                Arc::new(|_: &Value| Err(FieldError::Fatal("no".to_string()))),
            )
    }

    fn content(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_transform_and_merge() {
        let outcome = Transformer::new(false)
            .transform(
                &create_test_template(),
                &content(&[("name", json!("doe")), ("split", json!("Jane Doe"))]),
            )
            .unwrap();

        assert_eq!(outcome.values["name"], json!("DOE"));
        assert_eq!(outcome.values["first"], json!("Jane"));
        assert_eq!(outcome.values["last"], json!("Doe"));
        assert!(!outcome.values.contains_key("split"));
        assert!(outcome.failed_keys.is_empty());
    }

    #[test]
    fn test_null_values_are_skipped() {
        let outcome = Transformer::new(true)
            .transform(&create_test_template(), &content(&[("fatal", Value::Null)]))
            .unwrap();
        assert!(outcome.values.is_empty());
    }

    #[test]
    fn test_unknown_key_is_always_an_error() {
        let err = Transformer::new(false)
            .transform(&create_test_template(), &content(&[("other", json!("x"))]))
            .unwrap_err();
        assert!(matches!(err, TransformError::UnknownKey(key) if key == "other"));
    }

    #[test]
    fn test_malformed_is_recorded_when_lenient() {
        let outcome = Transformer::new(false)
            .transform(&create_test_template(), &content(&[("name", json!(5))]))
            .unwrap();
        assert_eq!(outcome.failed_keys, vec!["name".to_string()]);
        assert!(outcome.values.is_empty());
    }

    #[test]
    fn test_malformed_is_an_error_when_strict() {
        let err = Transformer::new(true)
            .transform(&create_test_template(), &content(&[("name", json!(5))]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: FieldError::Malformed(_),
                ..
            }
        ));
    }

    #[test]
    fn test_fatal_always_propagates() {
        let err = Transformer::new(false)
            .transform(&create_test_template(), &content(&[("fatal", json!("x"))]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: FieldError::Fatal(_),
                ..
            }
        ));
    }

    #[test]
    fn test_entities_are_decoded_before_transform() {
        let outcome = Transformer::new(false)
            .transform(
                &create_test_template(),
                &content(&[("name", json!("smith &amp; jones&#39;s &#x41;"))]),
            )
            .unwrap();
        assert_eq!(outcome.values["name"], json!("SMITH & JONES'S A"));
    }

    #[test]
    fn test_stray_ampersand_is_kept() {
        assert_eq!(decode_entities("A & B"), "A & B");
        assert_eq!(decode_entities("AT&T;"), "AT&T;");
    }

    #[test]
    fn test_later_field_replaces_earlier() {
        let template = TransformTemplate::new()
            .field("name", upper())
            .field("name", Arc::new(|v: &Value| Ok(v.clone())));
        assert_eq!(template.keys().count(), 1);
    }
}
