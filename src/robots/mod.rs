//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! The fetcher checks every page against its host's rules before requesting it.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the host of `page_url`
///
/// A missing, unreadable or unreachable robots.txt means everything is
/// allowed, so this never fails.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `page_url` - Any URL on the host whose robots.txt is wanted
/// * `timeout` - Request timeout
pub async fn fetch_robots(client: &Client, page_url: &Url, timeout: Duration) -> ParsedRobots {
    let robots_url = match page_url.join("/robots.txt") {
        Ok(url) => url,
        Err(_) => return ParsedRobots::allow_all(),
    };

    let response = match client.get(robots_url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Could not fetch {}: {}", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!("{} returned {}", robots_url, response.status());
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            tracing::debug!("Loaded {}", robots_url);
            ParsedRobots::from_content(&body)
        }
        Err(e) => {
            tracing::debug!("Could not read {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
