//! Run configuration: the sheet's header row plus free-form settings.
//!
//! Columns are addressed through alias keys (`col-lat`, `col-last-updated`,
//! ...) whose values name the real header. Header names are compared in a
//! normalized form, so `Line Item Id`, `line-item-id` and `LINE_ITEM_ID`
//! all match.
//!
//! ```rust,ignore
//! let mut config = Config::new();
//! config.set_headers(vec!["Line Item Id".into(), "Latitude".into()]);
//! assert_eq!(config.get_header_index("col-lat")?, 1);
//! ```

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::env;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Setting holding the staleness window for strategies, in hours.
pub const HOURS_BETWEEN_UPDATES: &str = "hours-between-updates";

/// Alias of the column holding the Last-Updated record.
pub const COL_LAST_UPDATED: &str = "col-last-updated";

/// Alias of the column holding the API URL template.
pub const COL_API_URL: &str = "col-api-url";

/// Alias of the column holding the API headers template.
pub const COL_API_HEADERS: &str = "col-api-headers";

/// Header prefix marking columns filled from API responses.
pub const API_HEADER_PREFIX: &str = "api:";

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "SKYBID_";

/// Default column aliases (alias key -> header name).
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("col-line-item-id", "Line Item Id"),
    ("col-insertion-order-id", "Insertion Order Id"),
    ("col-advertiser-id", "Advertiser ID"),
    ("col-lat", "Latitude"),
    ("col-lon", "Longitude"),
    (COL_API_URL, "Api URL"),
    (COL_API_HEADERS, "Api Headers"),
    (COL_LAST_UPDATED, "Last Updated"),
];

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Lowercase `name` and collapse every run of non-alphanumerics into `-`.
pub fn normalize_header(name: &str) -> String {
    NON_ALNUM
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Index of the first header matching `name` after normalization.
pub fn find_header(headers: &[String], name: &str) -> Option<usize> {
    let wanted = normalize_header(name);
    headers.iter().position(|h| normalize_header(h) == wanted)
}

/// Index of the only header matching `name` after normalization.
///
/// Fails when no header matches, or when two headers normalize to the same
/// name (`Latitude` and `latitude `).
pub fn find_unique_header(headers: &[String], name: &str) -> ConfigResult<usize> {
    let wanted = normalize_header(name);
    let mut matches = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| normalize_header(h) == wanted)
        .map(|(i, _)| i);

    match (matches.next(), matches.next()) {
        (Some(index), None) => Ok(index),
        (Some(_), Some(_)) => Err(ConfigError::AmbiguousColumn(name.to_string())),
        _ => Err(ConfigError::ColumnNotFound(name.to_string())),
    }
}

/// Map every `api:<path>` header to its column index, first match wins.
pub fn api_headers(headers: &[String]) -> IndexMap<String, usize> {
    let mut out = IndexMap::new();
    for (i, header) in headers.iter().enumerate() {
        if let Some(path) = header.trim().strip_prefix(API_HEADER_PREFIX) {
            out.entry(path.trim().to_string()).or_insert(i);
        }
    }
    out
}

/// Header row and settings for one processing run.
#[derive(Debug, Clone)]
pub struct Config {
    headers: Vec<String>,
    /// Free-form settings, including the column aliases.
    pub config: IndexMap<String, Value>,
}

impl Config {
    /// Create a config holding the default column aliases and no headers.
    pub fn new() -> Self {
        let config = DEFAULT_ALIASES
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self {
            headers: Vec::new(),
            config,
        }
    }

    /// Store the header row used by subsequent lookups.
    pub fn set_headers(&mut self, headers: Vec<String>) {
        self.headers = headers;
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Resolve an alias key to the index of the column it names.
    ///
    /// Errors name the alias key, not the header it points to.
    pub fn get_header_index(&self, name: &str) -> ConfigResult<usize> {
        let column = match self.config.get(name) {
            Some(Value::String(column)) => column,
            _ => return Err(ConfigError::ColumnNotFound(name.to_string())),
        };
        find_unique_header(&self.headers, column).map_err(|e| match e {
            ConfigError::AmbiguousColumn(_) => ConfigError::AmbiguousColumn(name.to_string()),
            _ => ConfigError::ColumnNotFound(name.to_string()),
        })
    }

    /// Map every `api:<path>` header to its column index.
    pub fn get_api_headers(&self) -> IndexMap<String, usize> {
        api_headers(&self.headers)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.config.insert(key.into(), value.into());
    }

    /// Staleness window, accepting a number or a numeric string.
    pub fn hours_between_updates(&self) -> Option<f64> {
        match self.config.get(HOURS_BETWEEN_UPDATES)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Merge settings from a two-column `key,value` CSV (the config sheet).
    ///
    /// Rows with an empty key are ignored; numeric values are stored as numbers.
    pub fn load_settings_csv(&mut self, path: impl AsRef<Path>) -> ConfigResult<usize> {
        let content = std::fs::read_to_string(path)?;
        self.load_settings_str(&content)
    }

    pub fn load_settings_str(&mut self, content: &str) -> ConfigResult<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut loaded = 0;
        for record in reader.records() {
            let record = record?;
            let key = record.get(0).unwrap_or("").trim();
            if key.is_empty() {
                continue;
            }
            let raw = record.get(1).unwrap_or("").trim();
            self.config.insert(key.to_string(), setting_value(raw));
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Override settings from `SKYBID_*` environment variables.
    ///
    /// `SKYBID_HOURS_BETWEEN_UPDATES=6` sets `hours-between-updates`.
    pub fn apply_env(&mut self) -> usize {
        self.apply_vars(env::vars())
    }

    fn apply_vars(&mut self, vars: impl Iterator<Item = (String, String)>) -> usize {
        let mut applied = 0;
        for (name, raw) in vars {
            if let Some(rest) = name.strip_prefix(ENV_PREFIX) {
                let key = rest.to_lowercase().replace('_', "-");
                if key.is_empty() {
                    continue;
                }
                self.config.insert(key, setting_value(raw.trim()));
                applied += 1;
            }
        }
        applied
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn setting_value(raw: &str) -> Value {
    raw.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}
