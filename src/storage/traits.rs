//! Storage traits and error types

use crate::crawler::Record;
use crate::output::PageReport;
use crate::state::{CrawlSnapshot, PageState};
use crate::storage::{RunRecord, RunStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Everything the crawl persists goes through this trait: runs, page
/// outcomes, records and checkpoints.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run, if any
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run without finishing it
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Sets the final status of a run and stamps its finish time
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Pages =====

    /// Stores the outcome of a completed page
    ///
    /// A page completed twice in the same run (after a resume) keeps only
    /// its latest outcome.
    fn upsert_page(&mut self, run_id: i64, report: &PageReport<'_>) -> StorageResult<()>;

    // ===== Records =====

    /// Stores extracted records in one transaction
    ///
    /// # Returns
    ///
    /// The number of rows inserted
    fn insert_records(&mut self, run_id: i64, records: &[Record]) -> StorageResult<usize>;

    /// Counts records across all runs
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records grouped by site ID
    fn count_records_by_site(&self) -> StorageResult<HashMap<String, u64>>;

    // ===== Checkpoints =====

    /// Saves a crawl snapshot for a run
    fn save_checkpoint(&mut self, run_id: i64, snapshot: &CrawlSnapshot) -> StorageResult<()>;

    /// Loads the newest snapshot saved for a run
    fn load_latest_checkpoint(&self, run_id: i64) -> StorageResult<Option<CrawlSnapshot>>;

    // ===== Statistics =====

    /// Counts pages in a given state
    fn count_pages_by_state(&self, state: PageState) -> StorageResult<u64>;

    /// Counts all stored pages
    fn count_total_pages(&self) -> StorageResult<u64>;
}
