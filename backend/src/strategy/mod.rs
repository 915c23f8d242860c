//! Strategy plugins and the row processor that drives them
//!
//! This module provides:
//! - `registry`: ordered strategy chains keyed by direction and trigger column
//! - `processor`: per-row pipeline (staleness gate, chain, `api:` merge, stamping)
//! - `last_updated`: helpers over the Last-Updated record cell
//! - `error_log`: per-run error accumulator
//! - `builtin`: the generic AnyAPI strategy
//!
//! ## Flow for one row
//!
//! ```text
//! row → active chains for direction → skip fresh strategies → strategy.process
//!     → replace row | merge api:<path> columns → stamp Last Updated → row'
//! ```

pub mod builtin;
pub mod error_log;
pub mod last_updated;
pub mod processor;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::StrategyResult;

pub use builtin::AnyApiStrategy;
pub use error_log::ErrorLog;
pub use last_updated::{
    gen_last_updated_json, get_last_updated, json_parse_safe, strategy_already_processed,
};
pub use processor::StrategyProcessor;
pub use registry::StrategyRegistry;

/// One sheet row, cells aligned with the header row
pub type Row = Vec<Value>;

/// When a strategy chain runs relative to the API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Before pushing data out: fetch and prepare values
    In,
    /// After fetching: turn fetched values into outputs
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(format!("Unknown direction: {}", other)),
        }
    }
}

/// What a strategy produced for a row
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutput {
    /// Nothing to do for this row
    Unchanged,
    /// Replacement row
    Row(Row),
    /// Object read through the `api:<path>` columns
    Values(Value),
}

/// A named row transformation
///
/// Implementations must not depend on anything but their arguments; the
/// processor owns all writes to the row.
pub trait Strategy: Send + Sync {
    /// Name used in the Last-Updated record and in error messages
    fn name(&self) -> &str;

    fn process(
        &self,
        headers: &[String],
        row: &[Value],
        config: Option<&Config>,
    ) -> StrategyResult<StrategyOutput>;
}

/// Strategy backed by a closure
pub struct FnStrategy<F> {
    name: String,
    func: F,
}

impl<F> FnStrategy<F>
where
    F: Fn(&[String], &[Value], Option<&Config>) -> StrategyResult<StrategyOutput> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Strategy for FnStrategy<F>
where
    F: Fn(&[String], &[Value], Option<&Config>) -> StrategyResult<StrategyOutput> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(
        &self,
        headers: &[String],
        row: &[Value],
        config: Option<&Config>,
    ) -> StrategyResult<StrategyOutput> {
        (self.func)(headers, row, config)
    }
}
