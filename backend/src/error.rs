//! Error types for the skybid strategy engine.
//!
//! This module defines one error type per concern:
//!
//! - [`ConfigError`] - Column lookup and config sheet errors
//! - [`ApiError`] - API client and HTTP fetch errors
//! - [`StrategyError`] - Errors returned by strategy plugins
//! - [`SheetError`] - CSV sheet host errors
//! - [`RunError`] - Top-level batch run errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while resolving columns or loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Column alias unknown, or aliased column missing from the header row.
    #[error("ERROR: Column '{0}' not found.")]
    ColumnNotFound(String),

    /// Aliased column name matches several headers after normalization.
    #[error("ERROR: Column '{0}' matches more than one header.")]
    AmbiguousColumn(String),

    /// Failed to read a config sheet.
    #[error("Failed to read config sheet: {0}")]
    Io(#[from] std::io::Error),

    /// Config sheet is not valid CSV.
    #[error("Invalid config sheet: {0}")]
    Csv(#[from] csv::Error),
}

// =============================================================================
// API Client Errors
// =============================================================================

/// Errors from the API client and its fetcher.
#[derive(Debug, Error)]
pub enum ApiError {
    /// URL is empty after parameter substitution.
    #[error("API URL cannot be empty.")]
    EmptyUrl,

    /// Headers template is not valid JSON.
    #[error("Invalid API headers: {0}")]
    InvalidHeaders(String),

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body is not JSON.
    #[error("Invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// =============================================================================
// Strategy Errors
// =============================================================================

/// Errors a strategy may return for one row.
///
/// The processor records these in its error log and moves on; they never
/// abort a run.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// API call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Column lookup failed.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A column the strategy reads is absent from the header row.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Any other strategy-specific failure.
    #[error("{0}")]
    Failed(String),
}

// =============================================================================
// Sheet Errors
// =============================================================================

/// Errors from the CSV sheet host.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read or write the sheet file.
    #[error("Sheet IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid CSV content.
    #[error("Invalid sheet CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Content could not be decoded.
    #[error("Failed to decode sheet: {0}")]
    Encoding(String),

    /// No header row.
    #[error("Sheet is empty")]
    Empty,
}

// =============================================================================
// Run Errors (top-level)
// =============================================================================

/// Top-level batch run errors.
///
/// Only schema-level problems surface here; per-row failures end up in the
/// run report's error log instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// Sheet host error.
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Config error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Run error.
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Result type for sheet operations.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for batch runs.
pub type RunResult<T> = Result<T, RunError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
