//! Sink trait and crawl summary types
//!
//! A sink receives everything the crawl produces: records, per-page outcomes,
//! checkpoints, and the final summary. The coordinator calls it from its
//! control loop only, so implementations need no internal locking.

use crate::crawler::{FetchStatus, PageRef, Record};
use crate::state::{CrawlPhase, CrawlSnapshot, FailedPage, PageState};
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while handing data to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Outcome of one completed page, as reported to the sink
#[derive(Debug, Clone, Copy)]
pub struct PageReport<'a> {
    pub page: &'a PageRef,
    pub state: PageState,
    pub status: &'a FetchStatus,
    pub attempts: u32,
    pub records: usize,
}

/// Summary of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phase: CrawlPhase,

    /// Pages fetched successfully in this run
    pub pages_visited: u64,
    pub records_extracted: u64,
    pub pages_failed: u64,
    pub warnings: u64,
    pub cancelled: bool,

    /// Pages that failed in this run
    pub failed: Vec<FailedPage>,
}

impl CrawlSummary {
    /// Wall-clock duration of the run in seconds
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }

    /// Percentage of completed pages that were fetched successfully
    pub fn success_rate(&self) -> f64 {
        let completed = self.pages_visited + self.pages_failed;
        if completed == 0 {
            return 0.0;
        }
        (self.pages_visited as f64 / completed as f64) * 100.0
    }
}

/// Destination for crawl output
pub trait Sink: Send {
    /// Receives the records of one page, in completion order
    fn accept(&mut self, records: &[Record]) -> SinkResult<()>;

    /// Receives a checkpoint of the crawl state
    fn checkpoint(&mut self, snapshot: &CrawlSnapshot) -> SinkResult<()>;

    /// Receives the outcome of one completed page
    fn record_page(&mut self, _report: &PageReport<'_>) -> SinkResult<()> {
        Ok(())
    }

    /// Called once after the final checkpoint
    fn finish(&mut self, _summary: &CrawlSummary) -> SinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(visited: u64, failed: u64) -> CrawlSummary {
        let now = Utc::now();
        CrawlSummary {
            started_at: now - chrono::Duration::seconds(90),
            finished_at: now,
            phase: CrawlPhase::Done,
            pages_visited: visited,
            records_extracted: visited * 10,
            pages_failed: failed,
            warnings: 0,
            cancelled: false,
            failed: vec![],
        }
    }

    #[test]
    fn test_success_rate() {
        let rate = summary(80, 20).success_rate();
        assert!((rate - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_success_rate_zero_pages() {
        assert_eq!(summary(0, 0).success_rate(), 0.0);
    }

    #[test]
    fn test_duration() {
        assert_eq!(summary(1, 0).duration_seconds(), 90);
    }
}
