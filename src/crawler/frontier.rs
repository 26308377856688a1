//! Frontier of pages waiting to be fetched
//!
//! This module handles:
//! - The `PageRef` identity of a listing page and its dedup key
//! - Expanding configured start URLs into seed pages
//! - Per-site FIFO queues served round-robin across sites
//! - The visited set, so a page is never queued twice
//! - Serializable snapshots for checkpoints and resume

use crate::config::{SiteConfig, PAGE_PLACEHOLDER};
use crate::url::dedup_key;
use crate::{ConfigError, UrlResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use url::Url;

/// A reference to one listing page of one site
///
/// Immutable once created. Identity for deduplication is `dedup_key`, the
/// normalized form of `url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    site_id: String,
    url: Url,
    page_number: u32,
    dedup_key: String,
}

impl PageRef {
    /// Creates a page reference, computing its dedup key
    ///
    /// Fails if the URL is not an http(s) URL with a host.
    pub fn new(site_id: impl Into<String>, url: Url, page_number: u32) -> UrlResult<Self> {
        let dedup_key = dedup_key(&url)?;
        Ok(Self {
            site_id: site_id.into(),
            url,
            page_number,
            dedup_key,
        })
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// URL as discovered; this is what gets fetched
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// 1-based position in the site's pagination chain
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn dedup_key(&self) -> &str {
        &self.dedup_key
    }
}

/// Expands a site's start URLs into seed pages
///
/// A start URL containing `{page}` expands to pages `1..=start_pages`
/// (one page if `start_pages` is unset). Other start URLs are page 1.
/// Pages beyond the site's `max_pages` are not seeded.
///
/// # Arguments
///
/// * `site` - The site configuration
///
/// # Returns
///
/// * `Ok(Vec<PageRef>)` - Seed pages in configuration order
/// * `Err(ConfigError)` - A start URL failed to parse
pub fn seed_pages(site: &SiteConfig) -> Result<Vec<PageRef>, ConfigError> {
    let mut seeds = Vec::new();
    let cap = site.max_pages.unwrap_or(u32::MAX);

    for raw in &site.start_urls {
        let pages = if raw.contains(PAGE_PLACEHOLDER) {
            1..=site.start_pages.unwrap_or(1)
        } else {
            1..=1
        };

        for page_number in pages.filter(|n| *n <= cap) {
            let expanded = raw.replace(PAGE_PLACEHOLDER, &page_number.to_string());
            let url = Url::parse(&expanded).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", expanded, e))
            })?;
            let page = PageRef::new(site.id.as_str(), url, page_number).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", expanded, e))
            })?;
            seeds.push(page);
        }
    }

    Ok(seeds)
}

/// Serializable frontier contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    /// Pending pages in dequeue order within each site
    pub pending: Vec<PageRef>,

    /// Dedup keys of pages that must never be fetched again
    pub visited: Vec<String>,
}

/// The crawl frontier
///
/// Pages are FIFO within a site, so each site is walked breadth-first.
/// `dequeue_batch` rotates across sites so that one long site cannot starve
/// the others.
#[derive(Debug, Default)]
pub struct Frontier {
    /// Pending pages per site
    queues: HashMap<String, VecDeque<PageRef>>,

    /// Sites with pending pages, in service order
    rotation: VecDeque<String>,

    /// Dedup keys currently queued
    pending: HashSet<String>,

    /// Dedup keys already handled (fetched or failed)
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a frontier from a snapshot
    pub fn restore(snapshot: FrontierSnapshot) -> Self {
        let mut frontier = Self::new();
        frontier.visited.extend(snapshot.visited);
        frontier.enqueue(snapshot.pending);
        frontier
    }

    /// Adds pages to the back of their site queues
    ///
    /// Pages whose key is already pending or visited are dropped, which makes
    /// enqueueing idempotent.
    ///
    /// # Returns
    ///
    /// The number of pages actually added
    pub fn enqueue<I>(&mut self, pages: I) -> usize
    where
        I: IntoIterator<Item = PageRef>,
    {
        let mut added = 0;

        for page in pages {
            if self.visited.contains(page.dedup_key()) || self.pending.contains(page.dedup_key())
            {
                tracing::trace!("Frontier already knows {}", page.url());
                continue;
            }

            self.pending.insert(page.dedup_key().to_string());

            let queue = self.queues.entry(page.site_id().to_string()).or_default();
            if queue.is_empty() {
                self.rotation.push_back(page.site_id().to_string());
            }
            queue.push_back(page);
            added += 1;
        }

        added
    }

    /// Removes up to `max_n` pages, taking one page per site in turn
    pub fn dequeue_batch(&mut self, max_n: usize) -> Vec<PageRef> {
        let mut batch = Vec::with_capacity(max_n.min(self.pending.len()));

        while batch.len() < max_n {
            let Some(site) = self.rotation.pop_front() else {
                break;
            };

            let Some(queue) = self.queues.get_mut(&site) else {
                continue;
            };

            if let Some(page) = queue.pop_front() {
                self.pending.remove(page.dedup_key());
                batch.push(page);
            }

            if !queue.is_empty() {
                self.rotation.push_back(site);
            }
        }

        batch
    }

    /// Records a page as handled
    ///
    /// # Returns
    ///
    /// `true` if the key was not visited before
    pub fn mark_visited(&mut self, key: &str) -> bool {
        self.visited.insert(key.to_string())
    }

    /// Puts a page back at the front of its site queue
    ///
    /// Used for pages that were dequeued but never completed.
    pub fn requeue_front(&mut self, page: PageRef) -> bool {
        if self.visited.contains(page.dedup_key()) || self.pending.contains(page.dedup_key()) {
            return false;
        }

        self.pending.insert(page.dedup_key().to_string());

        let queue = self.queues.entry(page.site_id().to_string()).or_default();
        if queue.is_empty() {
            self.rotation.push_front(page.site_id().to_string());
        }
        queue.push_front(page);
        true
    }

    /// Drops every pending page whose site is not in `sites`
    ///
    /// # Returns
    ///
    /// The number of pages dropped
    pub fn retain_sites(&mut self, sites: &HashSet<&str>) -> usize {
        let mut dropped = 0;

        self.queues.retain(|site, queue| {
            if sites.contains(site.as_str()) {
                return true;
            }
            dropped += queue.len();
            false
        });
        self.rotation.retain(|site| sites.contains(site.as_str()));

        let queues = &self.queues;
        self.pending
            .retain(|key| queues.values().flatten().any(|p| p.dedup_key() == key));

        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending pages
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn is_visited(&self, key: &str) -> bool {
        self.visited.contains(key)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Captures pending pages and visited keys
    ///
    /// Pending pages are listed site by site in rotation order, which keeps
    /// each site's FIFO order across a restore.
    pub fn snapshot(&self) -> FrontierSnapshot {
        let pending = self
            .rotation
            .iter()
            .filter_map(|site| self.queues.get(site))
            .flatten()
            .cloned()
            .collect();

        let mut visited: Vec<String> = self.visited.iter().cloned().collect();
        visited.sort();

        FrontierSnapshot { pending, visited }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;

    fn page(site: &str, url: &str, n: u32) -> PageRef {
        PageRef::new(site, Url::parse(url).unwrap(), n).unwrap()
    }

    fn site_config(start_urls: &[&str], start_pages: Option<u32>, max_pages: Option<u32>) -> SiteConfig {
        SiteConfig {
            id: "books".to_string(),
            start_urls: start_urls.iter().map(|s| s.to_string()).collect(),
            start_pages,
            max_pages,
            selectors: SelectorConfig {
                record: "article".to_string(),
                next_page: None,
                fields: vec![],
            },
        }
    }

    #[test]
    fn test_page_ref_dedup_key_is_normalized() {
        let p = page("quotes", "https://www.quotes.example.com/page/2/#x", 2);

        assert_eq!(p.dedup_key(), "https://quotes.example.com/page/2");
        assert_eq!(p.url().as_str(), "https://www.quotes.example.com/page/2/#x");
    }

    #[test]
    fn test_page_ref_rejects_non_http() {
        let url = Url::parse("ftp://example.com/file").unwrap();
        assert!(PageRef::new("quotes", url, 1).is_err());
    }

    #[test]
    fn test_seed_pages_template() {
        let site = site_config(
            &["https://books.example.com/catalogue/page-{page}.html"],
            Some(3),
            None,
        );

        let seeds = seed_pages(&site).unwrap();
        let numbers: Vec<u32> = seeds.iter().map(|p| p.page_number()).collect();

        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(
            seeds[2].url().as_str(),
            "https://books.example.com/catalogue/page-3.html"
        );
    }

    #[test]
    fn test_seed_pages_respects_max_pages() {
        let site = site_config(
            &["https://books.example.com/catalogue/page-{page}.html"],
            Some(5),
            Some(2),
        );

        assert_eq!(seed_pages(&site).unwrap().len(), 2);
    }

    #[test]
    fn test_seed_pages_plain_url_is_page_one() {
        let site = site_config(&["https://quotes.example.com/"], None, None);
        let seeds = seed_pages(&site).unwrap();

        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].page_number(), 1);
    }

    #[test]
    fn test_enqueue_drops_duplicates() {
        let mut frontier = Frontier::new();

        let added = frontier.enqueue(vec![
            page("quotes", "https://quotes.example.com/page/1/", 1),
            page("quotes", "https://quotes.example.com/page/1", 1),
        ]);

        assert_eq!(added, 1);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_enqueue_visited_is_noop() {
        let mut frontier = Frontier::new();
        let p = page("quotes", "https://quotes.example.com/page/1/", 1);

        frontier.enqueue(vec![p.clone()]);
        let batch = frontier.dequeue_batch(1);
        assert!(frontier.mark_visited(batch[0].dedup_key()));

        assert_eq!(frontier.enqueue(vec![p]), 0);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_key_in_one_set_only() {
        let mut frontier = Frontier::new();
        let p = page("quotes", "https://quotes.example.com/page/1/", 1);

        frontier.enqueue(vec![p.clone()]);
        assert!(frontier.is_pending(p.dedup_key()));
        assert!(!frontier.is_visited(p.dedup_key()));

        frontier.dequeue_batch(1);
        assert!(!frontier.is_pending(p.dedup_key()));

        frontier.mark_visited(p.dedup_key());
        assert!(frontier.is_visited(p.dedup_key()));
        assert!(!frontier.is_pending(p.dedup_key()));
    }

    #[test]
    fn test_fifo_within_site() {
        let mut frontier = Frontier::new();
        frontier.enqueue((1..=3).map(|n| {
            page("quotes", &format!("https://quotes.example.com/page/{}/", n), n)
        }));

        let numbers: Vec<u32> = frontier
            .dequeue_batch(10)
            .iter()
            .map(|p| p.page_number())
            .collect();

        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_round_robin_across_sites() {
        let mut frontier = Frontier::new();
        frontier.enqueue((1..=3).map(|n| {
            page("quotes", &format!("https://quotes.example.com/page/{}/", n), n)
        }));
        frontier.enqueue((1..=2).map(|n| {
            page("books", &format!("https://books.example.com/page-{}.html", n), n)
        }));

        let sites: Vec<String> = frontier
            .dequeue_batch(5)
            .iter()
            .map(|p| p.site_id().to_string())
            .collect();

        assert_eq!(sites, vec!["quotes", "books", "quotes", "books", "quotes"]);
    }

    #[test]
    fn test_round_robin_across_small_batches() {
        let mut frontier = Frontier::new();
        frontier.enqueue((1..=3).map(|n| {
            page("quotes", &format!("https://quotes.example.com/page/{}/", n), n)
        }));
        frontier.enqueue(vec![page("books", "https://books.example.com/page-1.html", 1)]);

        assert_eq!(frontier.dequeue_batch(1)[0].site_id(), "quotes");
        assert_eq!(frontier.dequeue_batch(1)[0].site_id(), "books");
        assert_eq!(frontier.dequeue_batch(1)[0].site_id(), "quotes");
    }

    #[test]
    fn test_requeue_front() {
        let mut frontier = Frontier::new();
        frontier.enqueue((1..=2).map(|n| {
            page("quotes", &format!("https://quotes.example.com/page/{}/", n), n)
        }));

        let first = frontier.dequeue_batch(1).remove(0);
        assert!(frontier.requeue_front(first));

        assert_eq!(frontier.dequeue_batch(1)[0].page_number(), 1);
    }

    #[test]
    fn test_retain_sites() {
        let mut frontier = Frontier::new();
        frontier.enqueue(vec![
            page("quotes", "https://quotes.example.com/page/1/", 1),
            page("books", "https://books.example.com/page-1.html", 1),
        ]);

        let keep: HashSet<&str> = ["books"].into_iter().collect();
        assert_eq!(frontier.retain_sites(&keep), 1);
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.dequeue_batch(5)[0].site_id(), "books");
    }

    #[test]
    fn test_snapshot_restore() {
        let mut frontier = Frontier::new();
        frontier.enqueue((1..=3).map(|n| {
            page("quotes", &format!("https://quotes.example.com/page/{}/", n), n)
        }));
        let done = frontier.dequeue_batch(1).remove(0);
        frontier.mark_visited(done.dedup_key());

        let json = serde_json::to_string(&frontier.snapshot()).unwrap();
        let snapshot: FrontierSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = Frontier::restore(snapshot);

        assert_eq!(restored.len(), 2);
        assert!(restored.is_visited(done.dedup_key()));
        assert_eq!(restored.enqueue(vec![done]), 0);

        let numbers: Vec<u32> = restored
            .dequeue_batch(10)
            .iter()
            .map(|p| p.page_number())
            .collect();
        assert_eq!(numbers, vec![2, 3]);
    }
}
