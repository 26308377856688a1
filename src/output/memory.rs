//! In-memory sink
//!
//! Keeps everything the crawl produces in a shared buffer. Clones share the
//! buffer, so a caller can hand one clone to the coordinator and read the
//! results through another.

use crate::crawler::Record;
use crate::output::traits::{CrawlSummary, PageReport, Sink, SinkResult};
use crate::state::{CrawlSnapshot, PageState};
use std::sync::{Arc, Mutex, MutexGuard};

/// A completed page as seen by the in-memory sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub site_id: String,
    pub url: String,
    pub page_number: u32,
    pub state: PageState,
    pub attempts: u32,
    pub records: usize,
}

#[derive(Debug, Default)]
struct MemoryContents {
    records: Vec<Record>,
    pages: Vec<PageEntry>,
    checkpoints: Vec<CrawlSnapshot>,
    summary: Option<CrawlSummary>,
}

/// Sink that buffers output in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryContents>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn contents(&self) -> MutexGuard<'_, MemoryContents> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records accepted so far, in acceptance order
    pub fn records(&self) -> Vec<Record> {
        self.contents().records.clone()
    }

    /// Completed pages, in completion order
    pub fn pages(&self) -> Vec<PageEntry> {
        self.contents().pages.clone()
    }

    pub fn checkpoints(&self) -> Vec<CrawlSnapshot> {
        self.contents().checkpoints.clone()
    }

    pub fn last_checkpoint(&self) -> Option<CrawlSnapshot> {
        self.contents().checkpoints.last().cloned()
    }

    pub fn summary(&self) -> Option<CrawlSummary> {
        self.contents().summary.clone()
    }
}

impl Sink for MemorySink {
    fn accept(&mut self, records: &[Record]) -> SinkResult<()> {
        self.contents().records.extend_from_slice(records);
        Ok(())
    }

    fn checkpoint(&mut self, snapshot: &CrawlSnapshot) -> SinkResult<()> {
        self.contents().checkpoints.push(snapshot.clone());
        Ok(())
    }

    fn record_page(&mut self, report: &PageReport<'_>) -> SinkResult<()> {
        self.contents().pages.push(PageEntry {
            site_id: report.page.site_id().to_string(),
            url: report.page.url().to_string(),
            page_number: report.page.page_number(),
            state: report.state,
            attempts: report.attempts,
            records: report.records,
        });
        Ok(())
    }

    fn finish(&mut self, summary: &CrawlSummary) -> SinkResult<()> {
        self.contents().summary = Some(summary.clone());
        Ok(())
    }
}
