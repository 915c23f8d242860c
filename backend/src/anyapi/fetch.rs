//! HTTP GET collaborator used by the API client.

use once_cell::sync::OnceCell;
use std::thread;
use std::time::Duration;

use crate::api::logs::{log_info_indent, log_warning};
use crate::error::{ApiError, ApiResult};

/// Default number of attempts for transport errors
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Performs a blocking GET and returns the raw body.
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> ApiResult<String>;
}

/// `reqwest` blocking fetcher
///
/// The client is built on first use and shared by every later request.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    timeout: Duration,
    max_retries: u32,
    client: OnceCell<reqwest::blocking::Client>,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            client: OnceCell::new(),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = OnceCell::new();
        self
    }

    fn client(&self) -> ApiResult<&reqwest::blocking::Client> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ApiError::Request(e.to_string()))
        })
    }

    /// Set how many attempts are made on transport errors
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn try_get(
        &self,
        client: &reqwest::blocking::Client,
        url: &str,
        headers: &[(String, String)],
    ) -> ApiResult<String> {
        let mut request = client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get(&self, url: &str, headers: &[(String, String)]) -> ApiResult<String> {
        let client = self.client()?;

        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            log_info_indent(format!("GET {} (attempt {}/{})", url, attempt, self.max_retries), 1);
            match self.try_get(client, url, headers) {
                Ok(body) => return Ok(body),
                // Only transport failures are retried; a status answer is final.
                Err(e @ ApiError::Request(_)) => {
                    log_warning(format!("Attempt {}/{} failed: {}", attempt, self.max_retries, e));
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Request("no attempt made".to_string())))
    }
}
