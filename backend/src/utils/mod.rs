//! Small helpers shared by the strategies, the API client and the hosts.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fmt::Display;

use crate::jsonpath;

/// Encode key/value pairs as a query string, preserving their order.
///
/// ```rust,ignore
/// assert_eq!(encode_parameters([("foo", 1), ("bar", 2)]), "foo=1&bar=2");
/// ```
pub fn encode_parameters<K, V, I>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    params
        .into_iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(&v.to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Zip a list of keys and a list of values into a JSON object.
///
/// Keys without a matching value map to `null`; extra values are dropped.
pub fn arrays_to_json<K: AsRef<str>>(keys: &[K], values: &[Value]) -> Map<String, Value> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| {
            (
                key.as_ref().to_string(),
                values.get(i).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Look up a dotted path (with optional `!MAX`/`!MIN` tail) in `json`.
pub fn get_value_from_json(path: &str, json: &Value) -> Option<Value> {
    jsonpath::resolve(path, json)
}

/// Text shown in a spreadsheet cell for a JSON value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Parse a timestamp the way sheet cells usually carry them.
///
/// Accepts RFC 3339 and a few naive forms which are read as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a timestamp for a Last-Updated record (`2026-10-16T08:00:00.000Z`).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Whether `candidate` lies `hours` or more before `reference`.
///
/// An empty or unparsable candidate always counts as old. A candidate equal
/// to or after the reference never does, so `hours == 0` means "stale after
/// any elapsed time".
pub fn is_date_older_than_n_hours(reference: &DateTime<Utc>, candidate: &str, hours: f64) -> bool {
    let Some(candidate) = parse_timestamp(candidate) else {
        return true;
    };

    let elapsed_ms = (*reference - candidate).num_milliseconds();
    if elapsed_ms <= 0 {
        return false;
    }

    elapsed_ms as f64 >= hours * 3_600_000.0
}
