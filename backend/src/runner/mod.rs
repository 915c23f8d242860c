//! Batch runner: one pass of the strategy chains over a whole sheet.
//!
//! # Example
//!
//! ```rust,ignore
//! use skybid::{default_processor, run_sheet, Config, MemoryCache, ReqwestFetcher, Sheet};
//! use std::sync::Arc;
//!
//! let mut sheet = Sheet::from_path("bids.csv")?;
//! let mut processor = default_processor(Arc::new(MemoryCache::new()), Arc::new(ReqwestFetcher::new()));
//! let report = run_sheet(&mut processor, &mut sheet, Config::new());
//! sheet.write_to("bids.csv")?;
//! eprintln!("{}", report.errors);
//! ```

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::anyapi::HttpFetch;
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::cache::ResponseCache;
use crate::config::{api_headers, Config, HOURS_BETWEEN_UPDATES};
use crate::error::RunResult;
use crate::sheet::Sheet;
use crate::strategy::builtin::ANY_API_TRIGGER;
use crate::strategy::{AnyApiStrategy, Direction, Row, StrategyProcessor};

/// Summary of one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Rows visited
    pub rows: usize,
    /// Rows whose cells differ after the run
    pub changed: usize,
    /// Number of error messages
    pub error_count: usize,
    /// Error log, newline-joined
    pub errors: String,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Processed: {} rows, {} changed, {} errors",
            self.rows, self.changed, self.error_count
        )
    }
}

/// Build the run config
///
/// Settings come from the config sheet at `path` (if any), then `SKYBID_*`
/// environment variables, then the `hours` override.
pub fn load_config(path: Option<&Path>, hours: Option<f64>) -> RunResult<Config> {
    let mut config = Config::new();
    if let Some(path) = path {
        let loaded = config.load_settings_csv(path)?;
        log_info(format!("Config: {} settings from {}", loaded, path.display()));
    }
    config.apply_env();
    if let Some(hours) = hours {
        config.set(HOURS_BETWEEN_UPDATES, hours);
    }
    Ok(config)
}

/// Processor with the built-in strategies registered
///
/// `AnyAPI` runs as `IN` on the `Api URL` column.
pub fn default_processor(cache: Arc<dyn ResponseCache>, fetcher: Arc<dyn HttpFetch>) -> StrategyProcessor {
    let mut processor = StrategyProcessor::new();
    processor.register(
        Direction::In,
        ANY_API_TRIGGER,
        Arc::new(AnyApiStrategy::new(cache, fetcher)),
    );
    processor
}

/// Run `IN` then `OUT` over every row
///
/// The processor's error log is reset first, so the report covers this run
/// only. Row numbers in messages are 1-based sheet lines (header is line 1).
pub fn run_rows(
    processor: &mut StrategyProcessor,
    headers: &[String],
    rows: Vec<Row>,
    config: &Config,
) -> (Vec<Row>, RunReport) {
    processor.reset_errors();

    let api_columns = api_headers(headers);
    log_info(format!(
        "Running {} rows, {} api: columns",
        rows.len(),
        api_columns.len()
    ));

    let mut report = RunReport {
        rows: rows.len(),
        ..RunReport::default()
    };
    let mut out = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        processor.set_context(Some(format!("Row {}", i + 2)));
        let before = row.clone();

        let row = processor.process(Direction::In, headers, row, Some(config));
        let row = processor.process(Direction::Out, headers, row, Some(config));

        if row != before {
            report.changed += 1;
        }
        out.push(row);
    }
    processor.set_context(None);

    report.error_count = processor.error_log().len();
    report.errors = processor.get_error_messages();

    if report.error_count > 0 {
        log_warning(report.summary());
        for message in processor.error_log().messages().iter().take(5) {
            log_error(message.clone());
        }
    } else {
        log_success(report.summary());
    }

    (out, report)
}

/// Run over a sheet in place
///
/// The config's header row is replaced by the sheet's.
pub fn run_sheet(processor: &mut StrategyProcessor, sheet: &mut Sheet, mut config: Config) -> RunReport {
    config.set_headers(sheet.headers.clone());
    let rows = std::mem::take(&mut sheet.rows);
    let (rows, report) = run_rows(processor, &sheet.headers, rows, &config);
    sheet.rows = rows;
    report
}
