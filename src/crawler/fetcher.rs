//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Per-attempt timeouts and per-host concurrency limits
//! - Retry with exponential backoff and jitter for transient failures
//! - Honouring `Retry-After` on HTTP 429
//! - robots.txt checks before the first attempt
//!
//! A fetch never fails as a Rust error: every outcome is a `FetchResult`
//! whose `status` says what happened.

use super::events::{CrawlEvent, CrawlObserver};
use super::frontier::PageRef;
use crate::config::{FetchConfig, UserAgentConfig};
use crate::robots::RobotsCache;
use crate::url::host_key;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Relative jitter applied to every backoff delay
const JITTER: f64 = 0.2;

/// Outcome classification of a fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Success,
    HttpError(u16),
    Timeout,
    NetworkError(String),
    /// robots.txt forbids the URL; no request was made
    Disallowed,
}

impl FetchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if another attempt may succeed
    ///
    /// Timeouts, network errors, 429 and 5xx are transient. Any other 4xx
    /// is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::NetworkError(_) => true,
            Self::HttpError(code) => *code == 429 || (500..600).contains(code),
            Self::Success | Self::Disallowed => false,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::HttpError(code) => write!(f, "HTTP {}", code),
            Self::Timeout => write!(f, "timeout"),
            Self::NetworkError(msg) => write!(f, "network error: {}", msg),
            Self::Disallowed => write!(f, "disallowed by robots.txt"),
        }
    }
}

/// Result of fetching one page
///
/// `body` is present only when `status` is `Success`.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub page: PageRef,
    pub status: FetchStatus,
    pub body: Option<Vec<u8>>,
    /// URL after redirects; links on the page resolve against this
    pub final_url: Option<Url>,
    pub fetched_at: DateTime<Utc>,
    /// HTTP attempts made, zero when robots.txt disallowed the page
    pub attempts: u32,
}

impl FetchResult {
    pub fn success(page: PageRef, body: Vec<u8>, final_url: Url, attempts: u32) -> Self {
        Self {
            page,
            status: FetchStatus::Success,
            body: Some(body),
            final_url: Some(final_url),
            fetched_at: Utc::now(),
            attempts,
        }
    }

    pub fn failure(page: PageRef, status: FetchStatus, attempts: u32) -> Self {
        Self {
            page,
            status,
            body: None,
            final_url: None,
            fetched_at: Utc::now(),
            attempts,
        }
    }

    /// URL used as the base for relative links
    pub fn base_url(&self) -> &Url {
        self.final_url.as_ref().unwrap_or_else(|| self.page.url())
    }
}

/// Fetches pages
///
/// `HttpFetcher` is the real implementation; tests substitute stubs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, page: &PageRef, config: &FetchConfig) -> FetchResult;
}

/// Outcome of a single HTTP attempt
#[derive(Debug)]
pub enum Attempt {
    Fetched { body: Vec<u8>, final_url: Url },
    Failed {
        status: FetchStatus,
        /// Server-requested minimum wait before the next attempt
        retry_after: Option<Duration>,
    },
}

impl Attempt {
    pub fn failed(status: FetchStatus) -> Self {
        Self::Failed {
            status,
            retry_after: None,
        }
    }
}

/// Runs attempts until one succeeds, a permanent failure occurs, or
/// `max_retries` retries are used up
///
/// # Arguments
///
/// * `page` - The page being fetched
/// * `config` - Retry and backoff settings
/// * `observer` - Receives `FetchAttempt` and `FetchRetry` events
/// * `attempt` - Performs one attempt
///
/// # Returns
///
/// The final `FetchResult`, with `attempts` counting every attempt made
pub async fn fetch_with_retry<F, Fut>(
    page: &PageRef,
    config: &FetchConfig,
    observer: &dyn CrawlObserver,
    mut attempt: F,
) -> FetchResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        observer.on_event(&CrawlEvent::FetchAttempt {
            page,
            attempt: attempts,
        });

        match attempt().await {
            Attempt::Fetched { body, final_url } => {
                return FetchResult::success(page.clone(), body, final_url, attempts);
            }
            Attempt::Failed {
                status,
                retry_after,
            } => {
                if !status.is_transient() || attempts > config.max_retries {
                    return FetchResult::failure(page.clone(), status, attempts);
                }

                let delay = backoff_delay(config, attempts - 1, retry_after);
                observer.on_event(&CrawlEvent::FetchRetry {
                    page,
                    attempt: attempts,
                    status: &status,
                    delay,
                });
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Computes the wait before retry number `retry` (0-based)
///
/// `backoff_base * 2^retry` with ±20% jitter, capped at `backoff_max`. A
/// server `Retry-After` hint raises the delay but is never shortened.
pub fn backoff_delay(config: &FetchConfig, retry: u32, retry_after: Option<Duration>) -> Duration {
    let exponential = config
        .backoff_base()
        .saturating_mul(2u32.saturating_pow(retry.min(16)));
    let capped = exponential.min(config.backoff_max());

    let factor = 1.0 + rand::thread_rng().gen_range(-JITTER..=JITTER);
    let jittered = capped.mul_f64(factor).min(config.backoff_max());

    match retry_after {
        Some(hint) => jittered.max(hint),
        None => jittered,
    }
}

/// Parses a `Retry-After` header as delta-seconds or an HTTP-date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Builds an HTTP client with proper configuration
///
/// Timeouts are applied per request, so the client itself only bounds the
/// connect phase.
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Per-host semaphores, created on first use
#[derive(Debug, Default)]
struct HostLimiter {
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    fn semaphore(&self, host: &str, permits: usize) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(permits.max(1))))
            .clone()
    }
}

/// reqwest-backed `Fetcher`
pub struct HttpFetcher {
    client: Client,
    robots: RobotsCache,
    robots_agent: String,
    hosts: HostLimiter,
    observer: Arc<dyn CrawlObserver>,
}

impl HttpFetcher {
    /// Creates a fetcher identifying itself with `user_agent`
    pub fn new(
        user_agent: &UserAgentConfig,
        observer: Arc<dyn CrawlObserver>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent)?,
            robots: RobotsCache::new(),
            robots_agent: user_agent.crawler_name.clone(),
            hosts: HostLimiter::default(),
            observer,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, page: &PageRef, config: &FetchConfig) -> FetchResult {
        if config.respect_robots
            && !self
                .robots
                .is_allowed(&self.client, page.url(), &self.robots_agent, config.timeout())
                .await
        {
            return FetchResult::failure(page.clone(), FetchStatus::Disallowed, 0);
        }

        let host = host_key(page.url()).unwrap_or_default();
        let limiter = self.hosts.semaphore(&host, config.per_host_concurrency);
        let timeout = config.timeout();

        fetch_with_retry(page, config, self.observer.as_ref(), || {
            let limiter = Arc::clone(&limiter);
            let client = &self.client;
            let url = page.url().clone();
            async move {
                let _permit: Option<OwnedSemaphorePermit> = limiter.acquire_owned().await.ok();
                get_once(client, url, timeout).await
            }
        })
        .await
    }
}

/// Performs one GET and classifies the result
async fn get_once(client: &Client, url: Url, timeout: Duration) -> Attempt {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return Attempt::failed(classify_error(&e)),
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            parse_retry_after(response.headers())
        } else {
            None
        };
        return Attempt::Failed {
            status: FetchStatus::HttpError(status.as_u16()),
            retry_after,
        };
    }

    let final_url = response.url().clone();
    match response.bytes().await {
        Ok(body) => Attempt::Fetched {
            body: body.to_vec(),
            final_url,
        },
        Err(e) => Attempt::failed(classify_error(&e)),
    }
}

fn classify_error(error: &reqwest::Error) -> FetchStatus {
    if error.is_timeout() {
        FetchStatus::Timeout
    } else {
        FetchStatus::NetworkError(error.to_string())
    }
}
