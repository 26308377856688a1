//! Crawler module for page fetching, extraction and coordination
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry, backoff and per-host limits
//! - Selector-driven record extraction and next-page discovery
//! - The per-site frontier of pending pages
//! - The coordinator's control loop and its observer events

mod coordinator;
mod events;
mod extractor;
mod fetcher;
mod frontier;

pub use coordinator::Coordinator;
pub use events::{CrawlEvent, CrawlObserver, TracingObserver};
pub use extractor::{extract, extract_html, CompiledSelectors, Extraction, ExtractionWarning, Record};
pub use fetcher::{
    backoff_delay, build_http_client, fetch_with_retry, parse_retry_after, Attempt, FetchResult,
    FetchStatus, Fetcher, HttpFetcher,
};
pub use frontier::{seed_pages, Frontier, FrontierSnapshot, PageRef};

pub use crate::state::CrawlPhase;

use crate::config::Config;
use crate::output::{CrawlSummary, SqliteSink};
use crate::WalkError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl against the configured SQLite database
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database and pick the run (resumed unless `fresh`)
/// 2. Build the HTTP fetcher
/// 3. Run the coordinator until done or `cancel` fires
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `fresh` - Start a new run even if the last one can be resumed
/// * `cancel` - Cancels the crawl cooperatively when triggered
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - The crawl finished or was cancelled
/// * `Err(WalkError)` - Setup failed or the crawl hit a fatal error
pub async fn crawl(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CrawlSummary, WalkError> {
    let (sink, resume) = SqliteSink::open(config, config_hash, fresh)?;

    let observer: Arc<dyn CrawlObserver> = Arc::new(TracingObserver);
    let fetcher = HttpFetcher::new(&config.user_agent, Arc::clone(&observer))?;

    let mut coordinator = Coordinator::new(config, Arc::new(fetcher), Box::new(sink), resume)?
        .with_observer(observer)
        .with_cancel_token(cancel);

    coordinator.run().await
}
