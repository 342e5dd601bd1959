//! Transform functions used by page templates
//!
//! The plain functions work on strings. The adapters at the bottom lift them
//! into `TransformFn`s that accept the shapes produced by extraction (a
//! string, or a list of strings).

use super::engine::{FieldError, TransformFn};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const TIMESTAMP_FORMATS: &[&str] = &["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %I:%M %p", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];
const NAME_SUFFIXES: &[&str] = &["jr.", "jr", "sr.", "sr", "ii", "iii", "iv"];

/// Collapses runs of whitespace (including non-breaking spaces) and trims
///
/// Entities are already decoded by the transformer before any function
/// runs. Applying it twice gives the same result as applying it once.
///
/// # Examples
///
/// ```
/// use statehouse::transform::functions::normalize_str;
///
/// assert_eq!(normalize_str("  Revenue &\n  Finance\u{a0}"), "Revenue & Finance");
/// ```
pub fn normalize_str(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduces a phone number to digits with a leading country code
///
/// Ten-digit numbers get the `1` country code prefixed. Returns None when
/// the input contains no digits.
///
/// # Examples
///
/// ```
/// use statehouse::transform::functions::normalize_phone;
///
/// assert_eq!(normalize_phone("+1(555)-555-5555"), Some("15555555555".to_string()));
/// assert_eq!(normalize_phone("5555555555"), Some("15555555555".to_string()));
/// assert_eq!(normalize_phone(""), None);
/// ```
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0 => None,
        10 => Some(format!("1{}", digits)),
        _ => Some(digits),
    }
}

/// Parses a site timestamp as local time in `tz`
///
/// Accepts `1/13/2025 2:39:05 PM`, `1/13/2025 2:39 PM`, ISO-like
/// `2025-01-13 14:39:05`, and date-only forms which resolve to midnight.
///
/// # Errors
///
/// Returns `FieldError::Malformed` if no format matches or the local time
/// does not exist in the zone.
pub fn parse_timestamp(input: &str, tz: Tz) -> Result<DateTime<Tz>, FieldError> {
    let input = normalize_str(input);

    let naive = TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&input, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(&input, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| FieldError::Malformed(format!("unrecognized timestamp '{}'", input)))?;

    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| FieldError::Malformed(format!("'{}' does not exist in {}", input, tz)))
}

/// Splits a member heading such as `Sen. Jane Doe (D)` into its parts
///
/// The result has `first_name` and `last_name`, plus `party` when a
/// parenthesized suffix is present and `chamber` when the title names one.
///
/// # Errors
///
/// Returns `FieldError::Malformed` if no name remains after removing the
/// title and party.
pub fn split_member_name(input: &str) -> Result<Map<String, Value>, FieldError> {
    let mut rest = normalize_str(input);
    let mut fields = Map::new();

    if let (Some(open), true) = (rest.rfind('('), rest.ends_with(')')) {
        let party = rest[open + 1..rest.len() - 1].trim().to_string();
        if !party.is_empty() {
            fields.insert("party".to_string(), json!(party));
        }
        rest = rest[..open].trim().to_string();
    }

    let mut words: Vec<&str> = rest.split_whitespace().collect();
    if let Some(first) = words.first() {
        let chamber = match first.trim_end_matches('.').to_ascii_lowercase().as_str() {
            "sen" | "senator" => Some("senate"),
            "rep" | "representative" => Some("house"),
            _ => None,
        };
        if let Some(chamber) = chamber {
            fields.insert("chamber".to_string(), json!(chamber));
            words.remove(0);
        }
    }

    let words: Vec<&str> = words.into_iter().map(|w| w.trim_end_matches(',')).collect();
    let last_start = match words.len() {
        0 => return Err(FieldError::Malformed(format!("no name in '{}'", input))),
        1 => 0,
        n if n > 2 && NAME_SUFFIXES.contains(&words[n - 1].to_ascii_lowercase().as_str()) => n - 2,
        n => n - 1,
    };

    fields.insert("first_name".to_string(), json!(words[..last_start].join(" ")));
    fields.insert("last_name".to_string(), json!(words[last_start..].join(" ")));
    Ok(fields)
}

/// Parses an integer, ignoring thousands separators
pub fn parse_int(input: &str) -> Result<i64, FieldError> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse()
        .map_err(|_| FieldError::Malformed(format!("not an integer: '{}'", input)))
}

/// Removes a `mailto:` prefix and any query from an email link
pub fn strip_mailto(input: &str) -> String {
    let trimmed = input.trim();
    let address = trimmed
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("mailto:"))
        .map_or(trimmed, |_| &trimmed[7..]);
    address.split('?').next().unwrap_or_default().trim().to_string()
}

/// Returns the first string of an extracted value
fn first_string(value: &Value) -> Result<String, FieldError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| first_string(item).ok())
            .ok_or_else(|| FieldError::Malformed("empty list".to_string())),
        other => Err(FieldError::Malformed(format!("expected text, got {}", other))),
    }
}

/// Applies `f` to the first string of the value
pub fn scalar<F>(f: F) -> TransformFn
where
    F: Fn(&str) -> Result<Value, FieldError> + Send + Sync + 'static,
{
    Arc::new(move |value: &Value| f(&first_string(value)?))
}

/// Applies `f` to every string of the value, producing a list
pub fn list<F>(f: F) -> TransformFn
where
    F: Fn(&str) -> Result<Value, FieldError> + Send + Sync + 'static,
{
    Arc::new(move |value: &Value| match value {
        Value::Array(items) => items
            .iter()
            .map(|item| first_string(item).and_then(|s| f(&s)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(Value::Array(vec![f(&first_string(other)?)?])),
    })
}

/// Passes the value through unchanged
pub fn identity() -> TransformFn {
    Arc::new(|value: &Value| Ok(value.clone()))
}

/// Collects integer ids from a value into a deduplicated list
pub fn id_list() -> TransformFn {
    Arc::new(|value: &Value| {
        let items = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        let mut ids: Vec<i64> = Vec::new();
        for item in items {
            let id = match &item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| FieldError::Malformed(format!("not an id: {}", item)))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(json!(ids))
    })
}

/// Normalized text of the first match
pub fn text() -> TransformFn {
    scalar(|s| Ok(json!(normalize_str(s))))
}

/// Normalized text of every match
pub fn text_list() -> TransformFn {
    list(|s| Ok(json!(normalize_str(s))))
}

/// Phone number, `null` when empty
pub fn phone() -> TransformFn {
    scalar(|s| Ok(normalize_phone(s).map_or(Value::Null, Value::String)))
}

/// RFC 3339 timestamp in the given zone
pub fn timestamp(tz: Tz) -> TransformFn {
    scalar(move |s| Ok(json!(parse_timestamp(s, tz)?.to_rfc3339())))
}

/// Integer value
pub fn integer() -> TransformFn {
    scalar(|s| Ok(json!(parse_int(s)?)))
}

/// Member heading exploded into name, party and chamber fields
pub fn member_name() -> TransformFn {
    scalar(|s| Ok(Value::Object(split_member_name(s)?)))
}

/// Email address from a mailto link
pub fn email() -> TransformFn {
    scalar(|s| Ok(json!(strip_mailto(s))))
}
