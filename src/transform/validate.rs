use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A record did not satisfy its schema
#[derive(Debug, Error)]
#[error("Record failed validation: {0}")]
pub struct ValidationError(#[from] serde_json::Error);

/// Validates a transformed record by deserializing it into its typed schema
///
/// # Example
///
/// ```
/// use serde::Deserialize;
/// use serde_json::json;
/// use statehouse::transform::validate;
///
/// #[derive(Deserialize)]
/// struct Vote {
///     yeas: i64,
/// }
///
/// let record = json!({"yeas": 40}).as_object().unwrap().clone();
/// let vote: Vote = validate(&record).unwrap();
/// assert_eq!(vote.yeas, 40);
/// ```
pub fn validate<T: DeserializeOwned>(content: &Map<String, Value>) -> Result<T, ValidationError> {
    Ok(serde_json::from_value(Value::Object(content.clone()))?)
}
