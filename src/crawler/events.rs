//! Crawl observability hook
//!
//! The coordinator and fetcher report what they do as `CrawlEvent`s. The
//! default `TracingObserver` turns them into log lines; tests install their
//! own observer to assert on the sequence.

use super::extractor::ExtractionWarning;
use super::fetcher::FetchStatus;
use super::frontier::PageRef;
use crate::state::CrawlPhase;
use std::time::Duration;

/// Something that happened during a crawl
#[derive(Debug)]
pub enum CrawlEvent<'a> {
    /// An HTTP attempt is about to be made
    FetchAttempt { page: &'a PageRef, attempt: u32 },

    /// A transient failure will be retried after `delay`
    FetchRetry {
        page: &'a PageRef,
        attempt: u32,
        status: &'a FetchStatus,
        delay: Duration,
    },

    /// A page finished fetching (successfully or not)
    FetchCompleted {
        page: &'a PageRef,
        status: &'a FetchStatus,
        attempts: u32,
    },

    /// A page was fetched and matched records
    PageExtracted {
        page: &'a PageRef,
        records: usize,
        next_pages: usize,
    },

    /// A page was fetched but matched no records
    ContentExhausted { page: &'a PageRef },

    ExtractionWarning(&'a ExtractionWarning),

    /// A page ended in the failed set
    PageFailed {
        page: &'a PageRef,
        status: &'a FetchStatus,
        attempts: u32,
    },

    PhaseChanged { from: CrawlPhase, to: CrawlPhase },

    /// A checkpoint was handed to the sink
    Checkpoint { pending: usize, visited: usize },
}

/// Receives crawl events
///
/// Called from the control loop and from fetch tasks, so implementations
/// must be cheap and thread-safe.
pub trait CrawlObserver: Send + Sync {
    fn on_event(&self, event: &CrawlEvent<'_>);
}

/// Forwards crawl events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn on_event(&self, event: &CrawlEvent<'_>) {
        match event {
            CrawlEvent::FetchAttempt { page, attempt } => {
                tracing::trace!(site = page.site_id(), attempt, "GET {}", page.url());
            }
            CrawlEvent::FetchRetry {
                page,
                attempt,
                status,
                delay,
            } => {
                tracing::debug!(
                    site = page.site_id(),
                    attempt,
                    "Retrying {} after {:?} ({})",
                    page.url(),
                    delay,
                    status
                );
            }
            CrawlEvent::FetchCompleted {
                page,
                status,
                attempts,
            } => {
                tracing::debug!(
                    site = page.site_id(),
                    attempts,
                    "Fetched {}: {}",
                    page.url(),
                    status
                );
            }
            CrawlEvent::PageExtracted {
                page,
                records,
                next_pages,
            } => {
                tracing::info!(
                    site = page.site_id(),
                    page = page.page_number(),
                    records,
                    next_pages,
                    "Extracted {}",
                    page.url()
                );
            }
            CrawlEvent::ContentExhausted { page } => {
                tracing::info!(
                    site = page.site_id(),
                    page = page.page_number(),
                    "No records on {}, not following its next page",
                    page.url()
                );
            }
            CrawlEvent::ExtractionWarning(warning) => {
                tracing::warn!(
                    record = warning.record_index,
                    field = warning.field.as_str(),
                    "{}: {}",
                    warning.url,
                    warning.message
                );
            }
            CrawlEvent::PageFailed {
                page,
                status,
                attempts,
            } => {
                tracing::warn!(
                    site = page.site_id(),
                    attempts,
                    "Failed {}: {}",
                    page.url(),
                    status
                );
            }
            CrawlEvent::PhaseChanged { from, to } => {
                tracing::info!("Crawl phase {} -> {}", from, to);
            }
            CrawlEvent::Checkpoint { pending, visited } => {
                tracing::debug!(pending, visited, "Checkpoint written");
            }
        }
    }
}
