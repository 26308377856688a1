//! SQLite-backed sink
//!
//! Writes records, page outcomes and checkpoints for one run to the storage
//! backend, and decides at open time whether the run continues an earlier
//! one.

use crate::config::Config;
use crate::crawler::Record;
use crate::output::traits::{CrawlSummary, PageReport, Sink, SinkResult};
use crate::state::{CrawlPhase, CrawlSnapshot};
use crate::storage::{find_resumable_run, open_storage, RunStatus, SqliteStorage, Storage};
use crate::WalkError;
use std::path::Path;

/// Sink that persists everything to SQLite
pub struct SqliteSink {
    storage: SqliteStorage,
    run_id: i64,
}

impl SqliteSink {
    /// Opens the configured database and selects the run to write to
    ///
    /// Unless `fresh` is set, the latest run is continued when it did not
    /// complete and has a checkpoint; its newest snapshot is returned for the
    /// coordinator to restore. Otherwise a new run is created.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `fresh` - Ignore any resumable run
    ///
    /// # Returns
    ///
    /// * `Ok((SqliteSink, Option<CrawlSnapshot>))` - The sink and the snapshot to resume from
    /// * `Err(WalkError)` - The database could not be opened or queried
    pub fn open(
        config: &Config,
        config_hash: &str,
        fresh: bool,
    ) -> Result<(Self, Option<CrawlSnapshot>), WalkError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        Self::with_storage(storage, config_hash, fresh)
    }

    /// Same as `open`, with an already opened storage backend
    pub fn with_storage(
        mut storage: SqliteStorage,
        config_hash: &str,
        fresh: bool,
    ) -> Result<(Self, Option<CrawlSnapshot>), WalkError> {
        if !fresh {
            if let Some((run, snapshot)) = find_resumable_run(&storage)? {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Configuration changed since run #{} started; resuming anyway",
                        run.id
                    );
                }
                tracing::info!(
                    "Resuming run #{} ({} pending, {} visited)",
                    run.id,
                    snapshot.pending.len() + snapshot.in_flight.len(),
                    snapshot.visited.len()
                );
                storage.update_run_status(run.id, RunStatus::Running)?;
                return Ok((
                    Self {
                        storage,
                        run_id: run.id,
                    },
                    Some(snapshot),
                ));
            }
        }

        let run_id = storage.create_run(config_hash)?;
        tracing::info!("Starting run #{}", run_id);
        Ok((Self { storage, run_id }, None))
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }
}

impl Sink for SqliteSink {
    fn accept(&mut self, records: &[Record]) -> SinkResult<()> {
        self.storage.insert_records(self.run_id, records)?;
        Ok(())
    }

    fn checkpoint(&mut self, snapshot: &CrawlSnapshot) -> SinkResult<()> {
        self.storage.save_checkpoint(self.run_id, snapshot)?;
        Ok(())
    }

    fn record_page(&mut self, report: &PageReport<'_>) -> SinkResult<()> {
        self.storage.upsert_page(self.run_id, report)?;
        Ok(())
    }

    fn finish(&mut self, summary: &CrawlSummary) -> SinkResult<()> {
        let status = match summary.phase {
            CrawlPhase::Done => RunStatus::Completed,
            _ => RunStatus::Cancelled,
        };
        self.storage.finish_run(self.run_id, status)?;
        Ok(())
    }
}
