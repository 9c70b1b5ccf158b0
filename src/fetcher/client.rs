//! Blocking HTTP client with a politeness delay between requests and bounded retries.

use crate::fetcher::FetchError;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; lnscrape/0.1; +https://github.com/lnscrape)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 2;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429: the server asked us to slow down.
const BACKOFF_429_SECS: [u64; 3] = [30, 60, 90];

/// Body and declared content type of a binary download.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// GET with retries on timeouts, connection errors, 5xx and 429. Other failures return at once.
    pub fn get_with_retry(&mut self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let max_attempts = self.retry_count.max(1);
        let mut attempt = 0;
        loop {
            self.wait_delay();
            tracing::debug!(url = %url, attempt = attempt + 1, "GET");
            let result = self.inner.get(url).send();
            self.last_request = Some(Instant::now());
            let last_attempt = attempt + 1 >= max_attempts;
            match result {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = status.as_u16() == 429;
                    if (status.is_server_error() || rate_limited) && !last_attempt {
                        let backoff = if rate_limited {
                            backoff_at(&BACKOFF_429_SECS, attempt)
                        } else {
                            backoff_at(&self.backoff_secs, attempt)
                        };
                        tracing::warn!(url = %url, status = status.as_u16(), backoff_secs = backoff, "Retrying after HTTP error");
                        std::thread::sleep(Duration::from_secs(backoff));
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && !last_attempt {
                        let backoff = backoff_at(&self.backoff_secs, attempt);
                        tracing::warn!(url = %url, error = %e, backoff_secs = backoff, "Retrying after network error");
                        std::thread::sleep(Duration::from_secs(backoff));
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// GET a page and read it as text. Non-success status is an error carrying `context`.
    pub fn get_text(&mut self, url: &str, context: &str) -> Result<String, FetchError> {
        let response = self.get_checked(url, context)?;
        response.text().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    /// GET binary content (images).
    pub fn get_bytes(&mut self, url: &str, context: &str) -> Result<Download, FetchError> {
        let response = self.get_checked(url, context)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    fn get_checked(
        &mut self,
        url: &str,
        context: &str,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        let response = self.get_with_retry(url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                context: Some(context.to_string()),
            });
        }
        Ok(response)
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Backoff for the given attempt; the last value repeats when the list is short.
fn backoff_at(secs: &[u64], attempt: u32) -> u64 {
    secs.get(attempt as usize)
        .or_else(|| secs.last())
        .copied()
        .unwrap_or(1)
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Delay between requests in seconds. Default 2.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Number of attempts for transient failures (default 3, minimum 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. If shorter than retry_count - 1, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, FetchError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Client { source: e })?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_reuses_last_value() {
        assert_eq!(backoff_at(&[1, 2], 0), 1);
        assert_eq!(backoff_at(&[1, 2], 1), 2);
        assert_eq!(backoff_at(&[1, 2], 5), 2);
        assert_eq!(backoff_at(&[], 0), 1);
    }

    #[test]
    fn builder_clamps_retry_count() {
        let builder = PoliteClient::builder().retry_count(0);
        assert_eq!(builder.retry_count, 1);
    }

    #[test]
    fn empty_backoff_list_gets_exponential_default() -> Result<(), FetchError> {
        let client = PoliteClient::builder()
            .retry_count(4)
            .retry_backoff_secs(Vec::new())
            .build()?;
        assert_eq!(client.backoff_secs, vec![1, 2, 4]);
        Ok(())
    }
}
