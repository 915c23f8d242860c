//! Dotted-path value extraction from JSON.
//!
//! Paths use `.` as separator and support:
//! - Object field access: `main.temp`
//! - Array indexing with numeric segments: `list.0.weather`
//! - Terminal aggregates over the children of a node: `hourly.!MAX`, `hourly.!MIN`
//!
//! ```rust,ignore
//! use serde_json::json;
//! use skybid::jsonpath::resolve;
//!
//! let json = json!({"agg": {"a": 10, "b": 100, "c": 0.8}});
//! assert_eq!(resolve("agg.!MAX", &json), Some(json!(100)));
//! ```

use serde_json::{Number, Value};
use thiserror::Error;

/// Aggregate segment returning the largest child value.
pub const MAX_SEGMENT: &str = "!MAX";

/// Aggregate segment returning the smallest child value.
pub const MIN_SEGMENT: &str = "!MIN";

/// Why a path failed to resolve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("key '{key}' not found at '{at}'")]
    MissingKey { key: String, at: String },

    #[error("index '{index}' out of range at '{at}'")]
    IndexOutOfRange { index: String, at: String },

    #[error("value at '{at}' is not indexable")]
    NotIndexable { at: String },

    #[error("aggregate '{segment}' must be the last segment")]
    AggregateNotTerminal { segment: String },

    #[error("aggregate '{segment}' needs numeric children at '{at}'")]
    AggregateNotNumeric { segment: String, at: String },
}

#[derive(Clone, Copy)]
enum Aggregate {
    Max,
    Min,
}

impl Aggregate {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            MAX_SEGMENT => Some(Aggregate::Max),
            MIN_SEGMENT => Some(Aggregate::Min),
            _ => None,
        }
    }
}

/// Resolve `path` against `root`, returning `None` when it does not exist.
pub fn resolve(path: &str, root: &Value) -> Option<Value> {
    try_resolve(path, root).ok()
}

/// Resolve `path` against `root`, reporting why resolution failed.
pub fn try_resolve(path: &str, root: &Value) -> Result<Value, PathError> {
    if path.is_empty() {
        return Ok(root.clone());
    }

    let segments: Vec<&str> = path.split('.').collect();
    resolve_segments(root, &segments, 0)
}

fn resolve_segments(node: &Value, segments: &[&str], pos: usize) -> Result<Value, PathError> {
    let Some(segment) = segments.get(pos).copied() else {
        return Ok(node.clone());
    };
    let at = || segments[..pos].join(".");

    if let Some(aggregate) = Aggregate::from_segment(segment) {
        if pos + 1 != segments.len() {
            return Err(PathError::AggregateNotTerminal {
                segment: segment.to_string(),
            });
        }
        return aggregate_children(node, aggregate, segment, &at());
    }

    let child = match node {
        Value::Object(map) => map.get(segment).ok_or_else(|| PathError::MissingKey {
            key: segment.to_string(),
            at: at(),
        })?,
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .ok_or_else(|| PathError::IndexOutOfRange {
                index: segment.to_string(),
                at: at(),
            })?,
        _ => return Err(PathError::NotIndexable { at: at() }),
    };

    resolve_segments(child, segments, pos + 1)
}

fn aggregate_children(
    node: &Value,
    aggregate: Aggregate,
    segment: &str,
    at: &str,
) -> Result<Value, PathError> {
    let children: Vec<&Value> = match node {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => {
            return Err(PathError::NotIndexable { at: at.to_string() });
        }
    };

    let not_numeric = || PathError::AggregateNotNumeric {
        segment: segment.to_string(),
        at: at.to_string(),
    };

    let mut best: Option<&Number> = None;
    for child in children {
        let number = match child {
            Value::Number(n) => n,
            _ => return Err(not_numeric()),
        };
        let value = number.as_f64().ok_or_else(not_numeric)?;
        let replace = match best.and_then(Number::as_f64) {
            None => true,
            Some(current) => match aggregate {
                Aggregate::Max => value > current,
                Aggregate::Min => value < current,
            },
        };
        if replace {
            best = Some(number);
        }
    }

    best.map(|n| Value::Number(n.clone())).ok_or_else(not_numeric)
}
