//! # Skybid - spreadsheet-driven API bid automation
//!
//! Skybid reads a sheet of line items, calls the data API each row describes
//! (weather, geo, ...), copies selected values from the JSON response into
//! `api:<path>` columns and runs pluggable strategies over the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Sheet    │────▶│  Strategy   │────▶│  API Client │────▶│  api:<path> │
//! │  (CSV/UTF8) │     │  Processor  │     │  (+ cache)  │     │   columns   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skybid::{default_processor, run_sheet, Config, DiskCache, ReqwestFetcher, Sheet};
//! use std::sync::Arc;
//!
//! let mut sheet = Sheet::from_path("bids.csv")?;
//! let mut processor = default_processor(Arc::new(DiskCache::new()), Arc::new(ReqwestFetcher::new()));
//! let report = run_sheet(&mut processor, &mut sheet, Config::new());
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`jsonpath`] - Dot-path resolver with `!MAX`/`!MIN` aggregates
//! - [`utils`] - Cell, timestamp and query-string helpers
//! - [`config`] - Header aliases and run settings
//! - [`cache`] - Response caches
//! - [`anyapi`] - Templated API client and HTTP fetcher
//! - [`strategy`] - Strategy registry and row processor
//! - [`sheet`] - CSV sheet host
//! - [`runner`] - Batch runs over a sheet
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod jsonpath;
pub mod utils;
pub mod config;

// API access
pub mod cache;
pub mod anyapi;

// Processing
pub mod strategy;

// Hosts
pub mod sheet;
pub mod runner;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ApiError, ApiResult, ConfigError, ConfigResult, RunError, RunResult, ServerError, SheetError,
    SheetResult, StrategyError, StrategyResult,
};

// =============================================================================
// Re-exports - Resolver and helpers
// =============================================================================

pub use jsonpath::{resolve, try_resolve, PathError};

pub use utils::{
    arrays_to_json, cell_text, encode_parameters, format_timestamp, get_value_from_json,
    is_date_older_than_n_hours, parse_timestamp,
};

// =============================================================================
// Re-exports - Config
// =============================================================================

pub use config::{api_headers, find_header, find_unique_header, normalize_header, Config};

// =============================================================================
// Re-exports - API client and caches
// =============================================================================

pub use anyapi::{ApiClient, HttpFetch, ReqwestFetcher};
pub use cache::{DiskCache, MemoryCache, ResponseCache};

// =============================================================================
// Re-exports - Strategies
// =============================================================================

pub use strategy::{
    gen_last_updated_json, get_last_updated, json_parse_safe, strategy_already_processed,
    AnyApiStrategy, Direction, ErrorLog, FnStrategy, Row, Strategy, StrategyOutput,
    StrategyProcessor, StrategyRegistry,
};

// =============================================================================
// Re-exports - Hosts
// =============================================================================

pub use runner::{default_processor, load_config, run_rows, run_sheet, RunReport};
pub use sheet::Sheet;

pub use api::types::{error_response, ProcessResponse, RunSummary};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
