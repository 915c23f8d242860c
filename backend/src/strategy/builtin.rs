//! Built-in strategies.

use serde_json::Value;
use std::sync::Arc;

use super::{Strategy, StrategyOutput};
use crate::anyapi::{ApiClient, HttpFetch, ReqwestFetcher};
use crate::cache::{MemoryCache, ResponseCache};
use crate::config::{find_unique_header, normalize_header, Config, COL_API_HEADERS, COL_API_URL};
use crate::error::{ConfigError, StrategyError, StrategyResult};
use crate::utils::cell_text;

/// Header prefix of columns feeding `{{...}}` parameters
pub const API_PARAM_PREFIX: &str = "Api Param:";

/// Registered under the `Api URL` trigger column
pub const ANY_API_TRIGGER: &str = "Api URL";

/// Calls the API described by the row and hands the response to the
/// `api:<path>` columns.
///
/// The row supplies the URL template, the headers template and one
/// `Api Param: <name>` column per placeholder. A row with an empty URL cell
/// is left alone.
pub struct AnyApiStrategy {
    cache: Arc<dyn ResponseCache>,
    fetcher: Arc<dyn HttpFetch>,
}

impl AnyApiStrategy {
    pub const NAME: &'static str = "AnyAPI";

    pub fn new(cache: Arc<dyn ResponseCache>, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { cache, fetcher }
    }

    fn column(&self, headers: &[String], config: Option<&Config>, alias: &str, fallback: &str) -> StrategyResult<usize> {
        match config {
            Some(config) => Ok(config.get_header_index(alias)?),
            None => find_unique_header(headers, fallback).map_err(|e| match e {
                ConfigError::ColumnNotFound(_) => StrategyError::MissingColumn(fallback.to_string()),
                other => other.into(),
            }),
        }
    }
}

impl Default for AnyApiStrategy {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCache::new()), Arc::new(ReqwestFetcher::new()))
    }
}

/// `Api Param: *` columns as (`header`, `cell text`) pairs
///
/// The prefix must be followed by a name: `Api Parameters` is not a
/// parameter column.
pub fn api_params(headers: &[String], row: &[Value]) -> Vec<(String, String)> {
    let prefix = format!("{}-", normalize_header(API_PARAM_PREFIX));
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| normalize_header(h).starts_with(&prefix))
        .map(|(i, h)| (h.clone(), row.get(i).map(cell_text).unwrap_or_default()))
        .collect()
}

impl Strategy for AnyApiStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, headers: &[String], row: &[Value], config: Option<&Config>) -> StrategyResult<StrategyOutput> {
        let url_col = self.column(headers, config, COL_API_URL, "Api URL")?;
        let headers_col = self.column(headers, config, COL_API_HEADERS, "Api Headers").ok();

        let url = row.get(url_col).map(cell_text).unwrap_or_default();
        if url.trim().is_empty() {
            return Ok(StrategyOutput::Unchanged);
        }
        let headers_template = headers_col
            .and_then(|i| row.get(i))
            .map(cell_text)
            .unwrap_or_default();

        let mut client = ApiClient::new(url, headers_template)
            .with_cache(self.cache.clone())
            .with_fetcher(self.fetcher.clone());
        client.set_params(api_params(headers, row));

        let response = client.get()?;
        Ok(StrategyOutput::Values(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ApiResult};
    use crate::strategy::{Direction, StrategyProcessor};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeFetcher {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpFetch for FakeFetcher {
        fn get(&self, url: &str, _headers: &[(String, String)]) -> ApiResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if url.contains("fail") {
                return Err(ApiError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(r#"{"main": {"temp": 18.5}, "hourly": {"h1": 3, "h2": 9}}"#.to_string())
        }
    }

    fn headers() -> Vec<String> {
        [
            "Api URL",
            "Api Headers",
            "Api Param: City",
            "api:main.temp",
            "api:hourly.!MAX",
            "Last Updated",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_api_params() {
        let params = api_params(&headers(), &[json!(""), json!(""), json!("Paris")]);
        assert_eq!(params, vec![("Api Param: City".to_string(), "Paris".to_string())]);
    }

    #[test]
    fn test_api_params_need_a_name() {
        let headers: Vec<String> = ["Api Parameters", "Api Param:", "api_param_region", "Api Param: Key"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = vec![json!("a"), json!("b"), json!("eu"), json!("k1")];

        let params = api_params(&headers, &row);
        assert_eq!(
            params,
            vec![
                ("api_param_region".to_string(), "eu".to_string()),
                ("Api Param: Key".to_string(), "k1".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_url_columns_without_config() {
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), FakeFetcher::new());
        let headers = vec!["Api URL".to_string(), "api url".to_string()];
        let row = vec![json!("https://api.test/a"), json!("https://api.test/b")];

        let err = strategy.process(&headers, &row, None).unwrap_err();
        assert!(matches!(err, StrategyError::Config(ConfigError::AmbiguousColumn(_))));
    }

    #[test]
    fn test_fetch_and_merge_through_processor() {
        let fetcher = FakeFetcher::new();
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), fetcher.clone());

        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, ANY_API_TRIGGER, Arc::new(strategy));

        let headers = headers();
        let mut config = Config::new();
        config.set_headers(headers.clone());

        let row = vec![
            json!("https://api.test/w?q={{Api Param: City}}"),
            json!(""),
            json!("Paris"),
            json!(""),
            json!(""),
            json!(""),
        ];
        let out = processor.process(Direction::In, &headers, row, Some(&config));

        assert_eq!(out[3], json!(18.5));
        assert_eq!(out[4], json!(9));
        assert!(cell_text(&out[5]).contains(AnyApiStrategy::NAME));
        assert_eq!(fetcher.urls.lock().unwrap()[0], "https://api.test/w?q=Paris");
        assert!(processor.error_log().is_empty());
    }

    #[test]
    fn test_identical_requests_hit_shared_cache() {
        let fetcher = FakeFetcher::new();
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), fetcher.clone());
        let headers = headers();
        let row = vec![json!("https://api.test/w"), json!(""), json!("")];

        strategy.process(&headers, &row, None).unwrap();
        strategy.process(&headers, &row, None).unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_url_leaves_row_alone() {
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), FakeFetcher::new());
        let out = strategy.process(&headers(), &[json!("")], None).unwrap();
        assert_eq!(out, StrategyOutput::Unchanged);
    }

    #[test]
    fn test_failed_call_keeps_previous_values() {
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), FakeFetcher::new());
        let mut processor = StrategyProcessor::new();
        processor.register(Direction::In, ANY_API_TRIGGER, Arc::new(strategy));

        let headers = headers();
        let row = vec![
            json!("https://api.test/fail"),
            json!(""),
            json!(""),
            json!("old temp"),
        ];
        let out = processor.process(Direction::In, &headers, row, None);

        assert_eq!(out[3], json!("old temp"));
        assert_eq!(processor.get_error_messages(), "AnyAPI: HTTP 500: boom");
    }

    #[test]
    fn test_missing_url_column() {
        let strategy = AnyApiStrategy::new(Arc::new(MemoryCache::new()), FakeFetcher::new());
        let headers = vec!["Latitude".to_string()];
        let err = strategy.process(&headers, &[], None).unwrap_err();
        assert!(matches!(err, StrategyError::MissingColumn(_)));
    }
}
