//! HTTP client for the external tournament site
//!
//! Politeness: a shared rate limiter keeps a minimum interval between request
//! starts and a semaphore caps in-flight requests. Transient failures are
//! retried with exponential backoff up to a fixed attempt count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use decksync_common::config::SourceConfig;
use reqwest::{StatusCode, Url};
use tokio::sync::{Mutex, Semaphore};

use crate::models::RawDocument;
use crate::types::{SourceError, TournamentSource};
use crate::utils::{retry_transient, RetryPolicy};

/// Minimum-interval rate limiter
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to keep `min_interval` between request starts
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// reqwest-backed [`TournamentSource`]
pub struct HttpSourceClient {
    source_name: String,
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    in_flight: Arc<Semaphore>,
    retry_policy: RetryPolicy,
}

impl HttpSourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Terminal {
                url: config.base_url.clone(),
                reason: format!("HTTP client setup failed: {}", e),
            })?;

        Ok(Self {
            source_name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(Duration::from_millis(config.min_interval_ms))),
            in_flight: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            retry_policy: RetryPolicy::new(
                config.retry_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        })
    }

    pub fn listing_url(&self, page: u32) -> String {
        format!("{}/tournaments?page={}", self.base_url, page)
    }

    pub fn detail_url(&self, external_id: &str) -> String {
        format!("{}/tournaments/{}/decklists", self.base_url, external_id)
    }

    /// Fetch `url` with retry
    async fn fetch(&self, operation: &str, url: String) -> Result<RawDocument, SourceError> {
        let parsed = Url::parse(&url).map_err(|e| SourceError::Terminal {
            url: url.clone(),
            reason: format!("malformed URL: {}", e),
        })?;

        retry_transient(operation, &self.retry_policy, || self.fetch_once(parsed.clone())).await
    }

    /// One attempt, holding a concurrency permit
    async fn fetch_once(&self, url: Url) -> Result<RawDocument, SourceError> {
        let url_text = url.to_string();
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| SourceError::Terminal {
                url: url_text.clone(),
                reason: "source client shut down".to_string(),
            })?;

        self.rate_limiter.wait().await;

        tracing::debug!(url = %url_text, "Fetching source document");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(&url_text, e))?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(SourceError::Transient {
                url: url_text,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Terminal {
                url: url_text,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(&url_text, e))?;

        tracing::debug!(url = %url_text, bytes = body.len(), "Fetched source document");
        Ok(RawDocument::new(url_text, body))
    }
}

#[async_trait::async_trait]
impl TournamentSource for HttpSourceClient {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn fetch_listing(&self, page: u32) -> Result<RawDocument, SourceError> {
        self.fetch("fetch_listing", self.listing_url(page)).await
    }

    async fn fetch_tournament_detail(&self, external_id: &str) -> Result<RawDocument, SourceError> {
        self.fetch("fetch_tournament_detail", self.detail_url(external_id))
            .await
    }
}

/// 5xx, 408 and 429 are worth another attempt
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_request_error(url: &str, err: reqwest::Error) -> SourceError {
    if err.is_builder() || err.is_decode() || err.is_redirect() {
        SourceError::Terminal {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        // timeouts, refused connections, resets
        SourceError::Transient {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
