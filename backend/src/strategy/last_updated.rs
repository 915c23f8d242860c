//! Helpers over the Last-Updated record cell.
//!
//! The cell holds a JSON object `{"<strategy>": "<RFC 3339 timestamp>"}`.
//! Anything else in the cell (empty, garbage, a bare string) reads as an
//! empty record.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::api::logs::log_warning;
use crate::utils::{format_timestamp, is_date_older_than_n_hours};

/// Parse `text` as a JSON object, falling back to `{}`.
///
/// `quiet` suppresses the warning logged for unparsable input.
pub fn json_parse_safe(text: &str, quiet: bool) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => {
            if !quiet {
                log_warning(format!("Ignoring malformed JSON '{}': {}", text, e));
            }
            Map::new()
        }
    }
}

/// Value stored under `key` in a Last-Updated record, if any.
pub fn get_last_updated(key: &str, last_updated: &str) -> Option<Value> {
    json_parse_safe(last_updated, true).remove(key)
}

/// Record `key` as updated now, keeping the other entries.
pub fn gen_last_updated_json(key: &str, existing: &str) -> String {
    gen_last_updated_json_at(key, existing, &Utc::now())
}

pub fn gen_last_updated_json_at(key: &str, existing: &str, now: &DateTime<Utc>) -> String {
    let mut record = json_parse_safe(existing, true);
    record.insert(key.to_string(), Value::String(format_timestamp(now)));
    Value::Object(record).to_string()
}

/// Whether `name` ran within the last `hours` according to the record.
pub fn strategy_already_processed(name: &str, last_updated: &str, hours: f64) -> bool {
    strategy_already_processed_at(name, last_updated, hours, &Utc::now())
}

pub fn strategy_already_processed_at(
    name: &str,
    last_updated: &str,
    hours: f64,
    now: &DateTime<Utc>,
) -> bool {
    match get_last_updated(name, last_updated) {
        Some(Value::String(timestamp)) => !is_date_older_than_n_hours(now, &timestamp, hours),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_json_parse_safe_round_trip() {
        let value = json!({"key": "value", "nested": {"n": [1, 2, 3]}});
        let parsed = json_parse_safe(&value.to_string(), false);
        assert_eq!(Value::Object(parsed), value);
    }

    #[test]
    fn test_json_parse_safe_fallbacks() {
        assert!(json_parse_safe("", false).is_empty());
        assert!(json_parse_safe("\"\"", false).is_empty());
        assert!(json_parse_safe("{broken", true).is_empty());
        assert!(json_parse_safe("[1,2]", true).is_empty());
    }

    #[test]
    fn test_get_last_updated() {
        let record = r#"{"AnyAPI":"2020-01-01T00:00:00.000Z"}"#;
        assert_eq!(
            get_last_updated("AnyAPI", record),
            Some(json!("2020-01-01T00:00:00.000Z"))
        );
        assert_eq!(get_last_updated("Other", record), None);
        assert_eq!(get_last_updated("AnyAPI", "garbage"), None);
    }

    #[test]
    fn test_gen_last_updated_json_keeps_other_keys() {
        let now = crate::utils::parse_timestamp("2026-10-16T08:00:00.000Z").unwrap();
        let existing = r#"{"Other":"2020-01-01T00:00:00.000Z"}"#;

        let text = gen_last_updated_json_at("AnyAPI", existing, &now);
        let record: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(record["Other"], "2020-01-01T00:00:00.000Z");
        assert_eq!(record["AnyAPI"], "2026-10-16T08:00:00.000Z");
    }

    #[test]
    fn test_gen_last_updated_json_from_garbage() {
        let text = gen_last_updated_json("AnyAPI", "not json");
        let record = json_parse_safe(&text, false);
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("AnyAPI"));
    }

    #[test]
    fn test_strategy_already_processed() {
        let now = Utc::now();
        let record = gen_last_updated_json_at("StrategyTest2", "", &now);

        assert!(strategy_already_processed("StrategyTest2", &record, 1.0));
        assert!(!strategy_already_processed("Missing", &record, 1.0));

        let minute_ago = gen_last_updated_json_at("S", "", &(now - Duration::minutes(1)));
        assert!(!strategy_already_processed_at("S", &minute_ago, 0.0, &now));
        assert!(strategy_already_processed_at("S", &minute_ago, 1.0, &now));
    }

    #[test]
    fn test_stale_after_window() {
        let now = Utc::now();
        let h25 = gen_last_updated_json_at("S", "", &(now - Duration::hours(25)));
        let h23 = gen_last_updated_json_at("S", "", &(now - Duration::hours(23)));

        assert!(!strategy_already_processed_at("S", &h25, 24.0, &now));
        assert!(strategy_already_processed_at("S", &h23, 24.0, &now));
    }
}
