//! Robots.txt caching implementation
//!
//! One entry per host, refreshed after 24 hours. Each entry has its own async
//! lock so concurrent fetches to the same host wait for a single robots.txt
//! request instead of each issuing one.

use super::{fetch_robots, ParsedRobots};
use crate::url::host_key;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedRobots>>>;

/// Per-host robots.txt cache
#[derive(Debug, Default)]
pub struct RobotsCache {
    hosts: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `url` against its host's robots.txt, fetching it if needed
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for the robots.txt request
    /// * `url` - The page URL to check
    /// * `user_agent` - The robots.txt product token
    /// * `timeout` - Timeout for the robots.txt request
    pub async fn is_allowed(
        &self,
        client: &Client,
        url: &Url,
        user_agent: &str,
        timeout: std::time::Duration,
    ) -> bool {
        let Some(host) = host_key(url) else {
            return true;
        };

        let slot = self.slot(&host);
        let mut entry = slot.lock().await;

        let needs_fetch = entry.as_ref().map_or(true, CachedRobots::is_stale);
        if needs_fetch {
            let robots = fetch_robots(client, url, timeout).await;
            *entry = Some(CachedRobots::new(robots));
        }

        entry
            .as_ref()
            .map_or(true, |cached| cached.content.is_allowed(url.as_str(), user_agent))
    }

    /// Seeds the cache for a host, bypassing the network
    pub fn insert(&self, host: &str, robots: CachedRobots) {
        let slot = self.slot(host);
        if let Ok(mut entry) = slot.try_lock() {
            *entry = Some(robots);
        };
    }

    fn slot(&self, host: &str) -> Slot {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.entry(host.to_string()).or_default().clone()
    }
}
