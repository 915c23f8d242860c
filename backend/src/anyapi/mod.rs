//! Generic API client for row-driven requests
//!
//! A client is built from two templates taken from sheet cells: the URL and a
//! JSON headers blob. Both may contain `{{Param Name}}` tokens which
//! [`ApiClient::set_params`] replaces literally. Responses are parsed as JSON
//! and kept in a host-supplied [`ResponseCache`] keyed by request signature.
//!
//! ```rust,ignore
//! let mut client = ApiClient::new(
//!     "https://api.test/weather?q={{Api Param: City}}",
//!     r#"{"headers":{"apikey":"{{Api Param: Key}}"}}"#,
//! );
//! client.set_params([("Api Param: City", "Paris"), ("Api Param: Key", "secret")]);
//! let json = client.get()?;
//! ```

pub mod fetch;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;

use crate::api::logs::{log_info_indent, log_warning};
use crate::cache::{MemoryCache, ResponseCache};
use crate::error::{ApiError, ApiResult};
use crate::utils::cell_text;

pub use fetch::{HttpFetch, ReqwestFetcher};

/// Headers template used when the cell is empty
const EMPTY_HEADERS: &str = "{}";

static PARAM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("static regex"));

/// Client for one templated GET request
pub struct ApiClient {
    url: String,
    headers: String,
    cache: Arc<dyn ResponseCache>,
    fetcher: Arc<dyn HttpFetch>,
}

impl ApiClient {
    /// Create a client with a private in-memory cache and the reqwest fetcher
    pub fn new(url: impl Into<String>, headers: impl Into<String>) -> Self {
        let headers = headers.into();
        let headers = if headers.trim().is_empty() {
            EMPTY_HEADERS.to_string()
        } else {
            headers
        };

        Self {
            url: url.into(),
            headers,
            cache: Arc::new(MemoryCache::new()),
            fetcher: Arc::new(ReqwestFetcher::new()),
        }
    }

    /// Share a host-owned cache
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a custom fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &str {
        &self.headers
    }

    /// Replace every `{{key}}` token in the URL and headers templates
    ///
    /// Tokens without a matching parameter are left as they are.
    pub fn set_params<K, V, I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in params {
            let token = format!("{{{{{}}}}}", key.as_ref());
            self.url = self.url.replace(&token, value.as_ref());
            self.headers = self.headers.replace(&token, value.as_ref());
        }
    }

    /// Names of `{{...}}` tokens still present in either template
    pub fn unresolved_params(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for text in [&self.url, &self.headers] {
            for cap in PARAM_TOKEN.captures_iter(text) {
                let name = cap[1].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Cache key of the current request: `url|"<headers JSON string>"`
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.url, Value::String(self.headers.clone()))
    }

    /// Seed the cache with a response for `key`
    pub fn set_cache(&self, key: &str, value: Value) {
        self.cache.set(key, value);
    }

    /// HTTP headers carried by the headers template
    ///
    /// A `headers` object is used when present, otherwise the top-level
    /// scalar entries.
    pub fn request_headers(&self) -> ApiResult<Vec<(String, String)>> {
        let parsed: Value = serde_json::from_str(&self.headers)
            .map_err(|e| ApiError::InvalidHeaders(e.to_string()))?;

        let obj = match &parsed {
            Value::Object(obj) => match obj.get("headers") {
                Some(Value::Object(inner)) => inner,
                _ => obj,
            },
            _ => {
                return Err(ApiError::InvalidHeaders(
                    "headers template must be a JSON object".to_string(),
                ))
            }
        };

        let mut headers = Vec::new();
        for (name, value) in obj.iter().filter(|(_, v)| !v.is_object() && !v.is_array()) {
            let value = cell_text(value);
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidHeaders(format!("invalid header name '{}'", name)))?;
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::InvalidHeaders(format!("invalid value for header '{}'", name)))?;
            headers.push((name.clone(), value));
        }
        Ok(headers)
    }

    /// Perform the GET, answering from the cache when possible
    pub fn get(&self) -> ApiResult<Value> {
        if self.url.trim().is_empty() {
            return Err(ApiError::EmptyUrl);
        }

        let key = self.cache_key();
        if let Some(cached) = self.cache.get(&key) {
            log_info_indent(format!("Cache hit: {}", self.url), 1);
            return Ok(cached);
        }

        let unresolved = self.unresolved_params();
        if !unresolved.is_empty() {
            log_warning(format!(
                "Unresolved parameters in request to {}: {}",
                self.url,
                unresolved.join(", ")
            ));
        }

        let headers = self.request_headers()?;
        let body = self.fetcher.get(&self.url, &headers)?;
        let json: Value = serde_json::from_str(&body)?;

        self.cache.set(&key, json.clone());
        Ok(json)
    }
}
