//! HTTP client with retry and rate limiting
//!
//! Provides the client both source APIs are read through. It handles:
//! - Bearer-token authentication
//! - Automatic retries with configurable backoff
//! - `Retry-After` on 429 responses, capped at `max_backoff`
//! - Rate limiting to stay under the source's quota
//! - Error classification (transient vs. fatal)

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Settings of one API's client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix joined onto relative request paths
    pub base_url: Option<String>,
    /// Whole-request timeout, one attempt
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_type: BackoffType,
    /// `None` disables client-side throttling
    pub rate_limit: Option<RateLimiterConfig>,
    /// Sent with every request
    pub default_headers: HashMap<String, String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_type: BackoffType::Exponential,
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: HashMap::new(),
            user_agent: concat!("saas-landing/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`], starting from the defaults
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    inner: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.inner.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.inner.max_retries = retries;
        self
    }

    /// Backoff curve between retries, capped at `max`
    #[must_use]
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.inner.backoff_type = backoff_type;
        self.inner.initial_backoff = initial;
        self.inner.max_backoff = max;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.inner.rate_limit = Some(config);
        self
    }

    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.inner.rate_limit = None;
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.default_headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.inner.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.inner
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    /// JSON body
    pub body: Option<Value>,
    /// Replaces the client's `max_retries` for this request
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// What to do after one attempt
enum Attempt {
    /// Final answer, success or fatal error
    Done(Result<Response>),
    /// Transient failure; `error` is returned if no retries remain
    Retry { delay: Duration, error: Error },
}

/// HTTP client shared by the source clients
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    bearer_token: Option<String>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            rate_limiter: config.rate_limit.as_ref().map(RateLimiter::new),
            client,
            config,
            bearer_token: None,
        })
    }

    /// Client that authenticates every request with `Authorization: Bearer`
    pub fn with_bearer(config: HttpClientConfig, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            bearer_token: Some(token.into()),
            ..Self::with_config(config)?
        })
    }

    /// Send a request and decode its JSON body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<T> {
        let text = self.request(method, url, config).await?.text().await?;
        serde_json::from_str(&text).map_err(|e| Error::decode(format!("{url} returned invalid JSON: {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, config: RequestConfig) -> Result<T> {
        self.request_json(Method::GET, url, config).await
    }

    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, body: Value) -> Result<T> {
        self.request_json(Method::POST, url, RequestConfig::new().json(body))
            .await
    }

    /// Send a request, retrying transient failures.
    ///
    /// 429, 5xx, timeouts and connect errors are retried up to `max_retries`
    /// times. 401/403 fail immediately with `Error::Auth`; other 4xx fail
    /// with `Error::HttpStatus`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let url = self.resolve_url(url);
        let max_retries = config.max_retries.unwrap_or(self.config.max_retries);

        for attempt in 0..=max_retries {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait().await;
            }

            let sent = self.build_request(&method, &url, &config).send().await;
            match self.classify(&url, attempt, sent).await {
                Attempt::Done(result) => {
                    if result.is_ok() {
                        debug!(%method, %url, attempt, "Request succeeded");
                    }
                    return result;
                }
                Attempt::Retry { error, .. } if attempt == max_retries => return Err(error),
                Attempt::Retry { delay, error } => {
                    warn!(
                        %method,
                        %url,
                        attempt = attempt + 1,
                        of = max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(Error::MaxRetriesExceeded { max_retries })
    }

    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Delay before retry number `attempt + 1`, capped at `max_backoff`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff;
        let delay = match self.config.backoff_type {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => initial.saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.config.max_backoff)
    }

    fn build_request(&self, method: &Method, url: &str, config: &RequestConfig) -> RequestBuilder {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");

        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            request = request.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            request = request.query(&config.query);
        }
        if let Some(body) = &config.body {
            request = request.json(body);
        }
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn classify(
        &self,
        url: &str,
        attempt: u32,
        sent: std::result::Result<Response, reqwest::Error>,
    ) -> Attempt {
        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Attempt::Retry {
                    delay: self.calculate_backoff(attempt),
                    error: Error::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    },
                }
            }
            Err(e) if e.is_connect() => {
                return Attempt::Retry {
                    delay: self.calculate_backoff(attempt),
                    error: Error::Http(e),
                }
            }
            Err(e) => return Attempt::Done(Err(Error::Http(e))),
        };

        let status = response.status();
        if status.is_success() || status.is_redirection() || status.is_informational() {
            return Attempt::Done(Ok(response));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = retry_after(&response)
                .map(|delay| delay.min(self.config.max_backoff))
                .unwrap_or_else(|| self.calculate_backoff(attempt));
            return Attempt::Retry {
                delay,
                error: Error::RateLimited {
                    retry_after_seconds: delay.as_secs(),
                },
            };
        }

        let body = response.text().await.unwrap_or_default();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Attempt::Done(Err(Error::auth(format!(
                "{url} rejected credentials ({}): {body}",
                status.as_u16()
            ))));
        }

        let error = Error::http_status(status.as_u16(), body);
        if error.is_retryable() {
            Attempt::Retry {
                delay: self.calculate_backoff(attempt),
                error,
            }
        } else {
            Attempt::Done(Err(error))
        }
    }

    /// Absolute URLs pass through; paths are joined onto `base_url`
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_bearer_token", &self.bearer_token.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// `Retry-After` in seconds
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
