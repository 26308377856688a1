//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Run tracking and resumption support
//! - Page outcomes and extracted records
//! - Crawl checkpoints

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::CrawlSnapshot;
use crate::WalkError;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(WalkError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, WalkError> {
    SqliteStorage::new(path)
}

/// Finds the run a non-fresh crawl would continue
///
/// That is the latest run, if it did not complete and has a checkpoint.
/// Returns the run together with its newest snapshot.
pub fn find_resumable_run(
    storage: &dyn Storage,
) -> StorageResult<Option<(RunRecord, CrawlSnapshot)>> {
    let run = match storage.get_latest_run()? {
        Some(run) => run,
        None => return Ok(None),
    };

    if !run.status.is_resumable() {
        tracing::debug!("Latest run #{} is {}", run.id, run.status.to_db_string());
        return Ok(None);
    }

    match storage.load_latest_checkpoint(run.id)? {
        Some(snapshot) => Ok(Some((run, snapshot))),
        None => {
            tracing::info!("Run #{} has no checkpoint to resume from", run.id);
            Ok(None)
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    /// Whether a later invocation may continue this run from its checkpoint
    ///
    /// A run still marked `Running` was killed without a clean shutdown.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelled)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CrawlState;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::from_db_string(status.to_db_string()), Some(*status));
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("interrupted"), None);
    }

    #[test]
    fn test_find_resumable_run_needs_checkpoint() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(find_resumable_run(&storage).unwrap().is_none());

        let run_id = storage.create_run("hash").unwrap();
        assert!(find_resumable_run(&storage).unwrap().is_none());

        storage
            .save_checkpoint(run_id, &CrawlState::new().snapshot())
            .unwrap();
        let (run, _) = find_resumable_run(&storage).unwrap().unwrap();
        assert_eq!(run.id, run_id);

        storage.finish_run(run_id, RunStatus::Completed).unwrap();
        assert!(find_resumable_run(&storage).unwrap().is_none());
    }

    #[test]
    fn test_resumable_statuses() {
        assert!(RunStatus::Running.is_resumable());
        assert!(RunStatus::Cancelled.is_resumable());
        assert!(!RunStatus::Completed.is_resumable());
        assert!(!RunStatus::Failed.is_resumable());
    }
}
