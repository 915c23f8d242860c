//! Strategy Processor
//!
//! Runs the registered strategy chains over one row at a time. Failures of a
//! single strategy are recorded in the error log and never abort the row or
//! the run.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::error_log::ErrorLog;
use super::last_updated::{gen_last_updated_json_at, strategy_already_processed_at};
use super::registry::StrategyRegistry;
use super::{Direction, Row, Strategy, StrategyOutput};
use crate::api::logs::{log_info_indent, log_warning_indent};
use crate::config::{api_headers, Config, COL_LAST_UPDATED};
use crate::jsonpath;
use crate::utils::cell_text;

/// Registry plus the error log of the current run
#[derive(Default)]
pub struct StrategyProcessor {
    registry: StrategyRegistry,
    errors: ErrorLog,
    context: Option<String>,
}

impl StrategyProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Append `strategy` to the chain for (`direction`, `trigger`)
    pub fn register(&mut self, direction: Direction, trigger: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.registry.register(direction, trigger, strategy);
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Prefix for error messages recorded until the next call (e.g. `Row 4`)
    pub fn set_context(&mut self, context: Option<String>) {
        self.context = context;
    }

    /// Record one error; line breaks are folded so each message stays one
    /// line of the joined log.
    pub fn add_error_message(&mut self, message: impl Into<String>) {
        let message = single_line(&message.into());
        match &self.context {
            Some(context) => self.errors.add(format!("{} - {}", context, message)),
            None => self.errors.add(message),
        }
    }

    /// Error messages of the current run, newline-joined
    pub fn get_error_messages(&self) -> String {
        self.errors.joined()
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    /// Start a new run's error log
    pub fn reset_errors(&mut self) {
        self.errors.clear();
    }

    /// Run every active chain for `direction` over `row`
    ///
    /// When no chain applies the row comes back untouched, same allocation
    /// included.
    pub fn process(
        &mut self,
        direction: Direction,
        headers: &[String],
        row: Row,
        config: Option<&Config>,
    ) -> Row {
        self.process_at(direction, headers, row, config, Utc::now())
    }

    pub fn process_at(
        &mut self,
        direction: Direction,
        headers: &[String],
        mut row: Row,
        config: Option<&Config>,
        now: DateTime<Utc>,
    ) -> Row {
        let chains = self.registry.active_chains(direction, headers);
        if chains.is_empty() {
            return row;
        }

        let last_updated_col = match config.map(|c| c.get_header_index(COL_LAST_UPDATED)) {
            Some(Ok(col)) => Some(col),
            Some(Err(e)) => {
                self.add_error_message(e.to_string());
                return row;
            }
            None => None,
        };
        let hours = config.and_then(Config::hours_between_updates);

        for (trigger, chain) in chains {
            for strategy in chain {
                let name = strategy.name();

                if let (Some(col), Some(hours)) = (last_updated_col, hours) {
                    let record = row.get(col).map(cell_text).unwrap_or_default();
                    if strategy_already_processed_at(name, &record, hours, &now) {
                        log_info_indent(format!("{} skipped, updated within {}h", name, hours), 1);
                        continue;
                    }
                }

                match strategy.process(headers, &row, config) {
                    Ok(StrategyOutput::Unchanged) => continue,
                    Ok(StrategyOutput::Row(replacement)) => row = replacement,
                    Ok(StrategyOutput::Values(values)) => merge_api_values(headers, &mut row, &values),
                    Err(e) => {
                        log_warning_indent(format!("{} ({} {}) failed: {}", name, direction, trigger, e), 1);
                        self.add_error_message(format!("{}: {}", name, e));
                        continue;
                    }
                }

                if let Some(col) = last_updated_col {
                    let existing = row.get(col).map(cell_text).unwrap_or_default();
                    let record = gen_last_updated_json_at(name, &existing, &now);
                    set_cell(&mut row, col, Value::String(record));
                }
            }
        }

        row
    }
}

/// Write every resolvable `api:<path>` column from `values` into `row`
///
/// Paths missing from `values` leave their cell unchanged.
pub fn merge_api_values(headers: &[String], row: &mut Row, values: &Value) {
    for (path, col) in api_headers(headers) {
        if let Some(value) = jsonpath::resolve(&path, values) {
            set_cell(row, col, value);
        }
    }
}

fn single_line(text: &str) -> String {
    text.split(|c: char| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Set `row[col]`, padding short rows with empty cells
fn set_cell(row: &mut Row, col: usize, value: Value) {
    if row.len() <= col {
        row.resize(col + 1, Value::String(String::new()));
    }
    row[col] = value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HOURS_BETWEEN_UPDATES;
    use crate::error::{StrategyError, StrategyResult};
    use crate::strategy::last_updated::json_parse_safe;
    use crate::strategy::FnStrategy;
    use chrono::Duration;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn headers() -> Vec<String> {
        strings(&[
            "Api URL",
            "Api Headers",
            "Api Param: Region",
            "Strategy Test",
            "Last Updated",
        ])
    }

    fn row() -> Row {
        vec![
            json!("https://any-api-url.test"),
            json!(r#"{"headers":{"apikey": "some-key"}}"#),
            json!("param-value"),
            json!(""),
        ]
    }

    fn strategy<F>(name: &str, f: F) -> Arc<dyn Strategy>
    where
        F: Fn(&[String], &[Value], Option<&Config>) -> StrategyResult<StrategyOutput> + Send + Sync + 'static,
    {
        Arc::new(FnStrategy::new(name, f))
    }

    /// Leaves the row alone
    fn identity() -> Arc<dyn Strategy> {
        strategy("StrategyTest", |_h, _r, _c| Ok(StrategyOutput::Unchanged))
    }

    /// Replaces the row with the header row
    fn headers_as_row() -> Arc<dyn Strategy> {
        strategy("StrategyTest2", |h, _r, _c| {
            Ok(StrategyOutput::Row(h.iter().map(|s| json!(s)).collect()))
        })
    }

    fn config_for(headers: &[String]) -> Config {
        let mut config = Config::new();
        config.set_headers(headers.to_vec());
        config
    }

    #[test]
    fn test_no_strategies_returns_same_row() {
        let mut processor = StrategyProcessor::new();
        let row = row();
        let ptr = row.as_ptr();

        let out = processor.process(Direction::In, &headers(), row, None);
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(out, self::row());
    }

    #[test]
    fn test_register_and_process_identity() {
        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", identity());
        processor.register(Direction::Out, "Strategy Test", identity());

        for direction in [Direction::In, Direction::Out] {
            let row = row();
            let ptr = row.as_ptr();
            let out = processor.process(direction, &headers(), row, None);
            assert_eq!(out.as_ptr(), ptr);
        }
    }

    #[test]
    fn test_trigger_missing_from_headers() {
        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Other Column", headers_as_row());

        let out = processor.process(Direction::In, &headers(), row(), None);
        assert_eq!(out, row());
    }

    #[test]
    fn test_chain_applies_in_registration_order() {
        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", identity());
        processor.register(Direction::In, "Strategy Test", headers_as_row());

        let out = processor.process(Direction::In, &headers(), row(), None);
        let expected: Row = headers().iter().map(|s| json!(s)).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_each_strategy_sees_previous_output() {
        let mut processor = StrategyProcessor::new();
        let append = |suffix: &'static str| {
            strategy(suffix, move |_h, r, _c| {
                let mut next = r.to_vec();
                let text = format!("{}{}", cell_text(&next[3]), suffix);
                next[3] = json!(text);
                Ok(StrategyOutput::Row(next))
            })
        };
        processor.register(Direction::Out, "Strategy Test", append("a"));
        processor.register(Direction::Out, "Strategy Test", append("b"));

        let out = processor.process(Direction::Out, &headers(), row(), None);
        assert_eq!(out[3], json!("ab"));
    }

    #[test]
    fn test_missing_last_updated_column_is_logged() {
        // Config without headers cannot locate the Last Updated column.
        let mut config = Config::new();
        config.set(HOURS_BETWEEN_UPDATES, 1);

        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", identity());
        processor.register(Direction::In, "Strategy Test", headers_as_row());

        let row = row();
        let ptr = row.as_ptr();
        let out = processor.process(Direction::In, &headers(), row, Some(&config));

        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(
            processor.get_error_messages(),
            "ERROR: Column 'col-last-updated' not found."
        );
    }

    #[test]
    fn test_fresh_strategy_is_skipped_per_name() {
        let headers = headers();
        let mut config = config_for(&headers);
        config.set(HOURS_BETWEEN_UPDATES, 1);

        let now = Utc::now();
        let fresh = gen_last_updated_json_at("StrategyTest2", "", &(now - Duration::minutes(5)));
        let mut row = row();
        row.push(json!(fresh));

        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", headers_as_row());
        processor.register(
            Direction::In,
            "Strategy Test",
            strategy("Marker", |_h, r, _c| {
                let mut next = r.to_vec();
                next[3] = json!("marked");
                Ok(StrategyOutput::Row(next))
            }),
        );

        let out = processor.process_at(Direction::In, &headers, row, Some(&config), now);

        // StrategyTest2 was fresh and skipped; Marker ran and was stamped.
        assert_eq!(out[0], json!("https://any-api-url.test"));
        assert_eq!(out[3], json!("marked"));
        let record = json_parse_safe(&cell_text(&out[4]), false);
        assert_eq!(record.len(), 2);
        assert_eq!(
            record["Marker"],
            json!(crate::utils::format_timestamp(&now))
        );
    }

    #[test]
    fn test_stale_strategy_runs_again() {
        let headers = headers();
        let mut config = config_for(&headers);
        config.set(HOURS_BETWEEN_UPDATES, 24);

        let now = Utc::now();
        let stale = gen_last_updated_json_at("StrategyTest2", "", &(now - Duration::hours(25)));
        let mut row = row();
        row.push(json!(stale));

        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", headers_as_row());

        let out = processor.process_at(Direction::In, &headers, row, Some(&config), now);
        assert_eq!(out[0], json!("Api URL"));
        let record = json_parse_safe(&cell_text(&out[4]), false);
        assert_eq!(record["StrategyTest2"], json!(crate::utils::format_timestamp(&now)));
    }

    #[test]
    fn test_unchanged_output_is_not_stamped() {
        let headers = headers();
        let config = config_for(&headers);

        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, "Strategy Test", identity());

        let out = processor.process(Direction::In, &headers, row(), Some(&config));
        assert_eq!(out, row());
    }

    #[test]
    fn test_api_values_merge() {
        let headers = strings(&["Line Item Id", "api:foo.bar", "Trigger", "api:foo2", "api:missing.path"]);
        let mut processor = StrategyProcessor::new();
        processor.register(
            Direction::In,
            "Trigger",
            strategy("Fetch", |_h, _r, _c| {
                Ok(StrategyOutput::Values(json!({"foo": {"bar": "test1"}, "foo2": "test2"})))
            }),
        );

        let row = vec![json!("42"), json!(""), json!("x"), json!(""), json!("keep")];
        let out = processor.process(Direction::In, &headers, row, None);

        assert_eq!(
            out,
            vec![json!("42"), json!("test1"), json!("x"), json!("test2"), json!("keep")]
        );
    }

    #[test]
    fn test_merge_pads_short_rows() {
        let headers = strings(&["Trigger", "api:main.temp"]);
        let mut row = vec![json!("x")];
        merge_api_values(&headers, &mut row, &json!({"main": {"temp": 21.5}}));
        assert_eq!(row, vec![json!("x"), json!(21.5)]);
    }

    #[test]
    fn test_failure_is_logged_and_chain_continues() {
        let headers = headers();
        let config = config_for(&headers);

        let mut processor = StrategyProcessor::new();
        processor.set_context(Some("Row 2".to_string()));
        processor.register(
            Direction::In,
            "Strategy Test",
            strategy("Broken", |_h, _r, _c| Err(StrategyError::Failed("boom".into()))),
        );
        processor.register(Direction::In, "Strategy Test", headers_as_row());

        let out = processor.process(Direction::In, &headers, row(), Some(&config));

        assert_eq!(processor.get_error_messages(), "Row 2 - Broken: boom");
        assert_eq!(out[0], json!("Api URL"));
        let record = json_parse_safe(&cell_text(&out[4]), false);
        assert!(record.contains_key("StrategyTest2"));
        assert!(!record.contains_key("Broken"));
    }

    #[test]
    fn test_multiline_error_is_one_message() {
        let mut processor = StrategyProcessor::new();
        processor.set_context(Some("Row 2".to_string()));
        processor.register(
            Direction::In,
            "Strategy Test",
            strategy("Gateway", |_h, _r, _c| {
                Err(StrategyError::Api(crate::error::ApiError::Status {
                    status: 502,
                    body: "<html>\r\n<body>bad gateway</body>\n</html>".into(),
                }))
            }),
        );

        processor.process(Direction::In, &headers(), row(), None);

        assert_eq!(processor.error_log().len(), 1);
        assert_eq!(
            processor.get_error_messages(),
            "Row 2 - Gateway: HTTP 502: <html> <body>bad gateway</body> </html>"
        );
    }

    #[test]
    fn test_reset_errors() {
        let mut processor = StrategyProcessor::new();
        processor.add_error_message("first");
        processor.add_error_message("second");
        assert_eq!(processor.get_error_messages(), "first\nsecond");

        processor.reset_errors();
        assert!(processor.error_log().is_empty());
    }
}
