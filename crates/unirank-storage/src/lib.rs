//! HTTP fetch utilities, politeness delays, the university store and the JSON cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

mod cache;
mod delay;
mod postgres;
mod store;

pub use cache::UniversityCacheFile;
pub use delay::DelayPolicy;
pub use postgres::PgUniversityStore;
pub use store::{InMemoryUniversityStore, StoreError, StoredUniversity, UniversityStore};

pub const CRATE_NAME: &str = "unirank-storage";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Throttling, upstream hiccups and timeouts are worth another attempt; everything else is final.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Exponential pause between attempts against a ranking site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `base * 2^retry`, capped at `max_delay`.
    pub fn delay_before_retry(&self, retry: usize) -> Duration {
        let doubled = u32::try_from(retry)
            .ok()
            .and_then(|n| 2u32.checked_pow(n))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(doubled).min(self.max_delay)
    }

    /// Every pause a fetch may take before giving up.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.delay_before_retry(retry)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    /// Sent as `Referer`; some ranking sites serve a reduced page without one.
    pub referer: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            referer: None,
            global_concurrency: 8,
            per_source_concurrency: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Shared client for every ranking site: a global permit pool plus one pool per source id.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub final_url: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => is_retryable_error(source),
            FetchError::HttpStatus { status, .. } => {
                StatusCode::from_u16(*status).map(is_retryable_status).unwrap_or(false)
            }
            FetchError::Closed => false,
        }
    }
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(lang) = &config.accept_language {
            headers.insert(
                ACCEPT_LANGUAGE,
                HeaderValue::from_str(lang).context("invalid accept-language header")?,
            );
        }
        if let Some(referer) = &config.referer {
            headers.insert(REFERER, HeaderValue::from_str(referer).context("invalid referer header")?);
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .default_headers(headers)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build().context("building reqwest client")?,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn source_permits(&self, source_id: &str) -> Arc<Semaphore> {
        let mut pools = self.per_source.lock().await;
        Arc::clone(
            pools
                .entry(source_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit))),
        )
    }

    /// GET a listing or profile page, retrying per the backoff policy while holding both permits.
    pub async fn fetch_page(&self, run_id: Uuid, source_id: &str, url: &str) -> Result<FetchedPage, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        self.fetch_with_permits(source_id, url).instrument(span).await
    }

    async fn fetch_with_permits(&self, source_id: &str, url: &str) -> Result<FetchedPage, FetchError> {
        let _global = self.global_limit.acquire().await.map_err(|_| FetchError::Closed)?;
        let pool = self.source_permits(source_id).await;
        let _source = pool.acquire().await.map_err(|_| FetchError::Closed)?;

        let mut retry = 0;
        loop {
            match self.get_once(url).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && retry < self.backoff.max_retries => {
                    let wait = self.backoff.delay_before_retry(retry);
                    warn!(retry = retry + 1, wait_ms = wait.as_millis() as u64, error = %err, "retrying page fetch");
                    tokio::time::sleep(wait).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(request_error)?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let html = resp.text().await.map_err(request_error)?;
        debug!(status = status.as_u16(), bytes = html.len(), "fetched page");
        Ok(FetchedPage { status, final_url, html })
    }
}
