//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::Record;
use crate::output::PageReport;
use crate::state::{CrawlSnapshot, PageState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::WalkError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(WalkError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, WalkError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, WalkError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Pages =====

    fn upsert_page(&mut self, run_id: i64, report: &PageReport<'_>) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO pages
                (run_id, site_id, url, dedup_key, page_number, state, status, attempts, record_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(run_id, dedup_key) DO UPDATE SET
                state = excluded.state,
                status = excluded.status,
                attempts = excluded.attempts,
                record_count = excluded.record_count,
                updated_at = excluded.updated_at",
            params![
                run_id,
                report.page.site_id(),
                report.page.url().as_str(),
                report.page.dedup_key(),
                report.page.page_number(),
                report.state.to_db_string(),
                report.status.to_string(),
                report.attempts,
                report.records as i64,
                now,
            ],
        )?;
        Ok(())
    }

    // ===== Records =====

    fn insert_records(&mut self, run_id: i64, records: &[Record]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (run_id, site_id, page_key, page_url, fields, extracted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for record in records {
                let fields = serde_json::to_string(record.fields())?;
                stmt.execute(params![
                    run_id,
                    record.site_id(),
                    record.source().dedup_key(),
                    record.source().url().as_str(),
                    fields,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(records.len())
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records_by_site(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT site_id, COUNT(*) FROM records GROUP BY site_id")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(counts)
    }

    // ===== Checkpoints =====

    fn save_checkpoint(&mut self, run_id: i64, snapshot: &CrawlSnapshot) -> StorageResult<()> {
        let json = snapshot.to_json()?;
        let pending = (snapshot.pending.len() + snapshot.in_flight.len()) as i64;

        // Only the newest snapshot of a run is ever read back
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO checkpoints (run_id, taken_at, pending, visited, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                snapshot.taken_at.to_rfc3339(),
                pending,
                snapshot.visited.len() as i64,
                json,
            ],
        )?;
        let latest = tx.last_insert_rowid();
        tx.execute(
            "DELETE FROM checkpoints WHERE run_id = ?1 AND id < ?2",
            params![run_id, latest],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_latest_checkpoint(&self, run_id: i64) -> StorageResult<Option<CrawlSnapshot>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM checkpoints WHERE run_id = ?1 ORDER BY id DESC LIMIT 1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(CrawlSnapshot::from_json(&json)?)),
            None => Ok(None),
        }
    }

    // ===== Statistics =====

    fn count_pages_by_state(&self, state: PageState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
