//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Every worker opens its own `SqliteStorage`; WAL mode plus a busy timeout
//! lets those connections commit concurrently without spurious lock errors.

use crate::state::PrefixState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, Storage, StorageError, StorageResult};
use crate::storage::{
    FrontierEntry, PrefixResultRecord, RecordUpdate, RunRecord, RunStatus, StoredRecord,
    UpsertOutcome,
};
use crate::SweepError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

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
    /// * `busy_timeout` - How long to wait on a database locked by another connection
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SweepError)` - Failed to open database
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self, SweepError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        // Configure SQLite for concurrent writers
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SweepError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Running),
        })
    }
}

impl RecordStore for SqliteStorage {
    fn upsert_record(&mut self, update: &RecordUpdate) -> StorageResult<UpsertOutcome> {
        if update.identity.trim().is_empty() {
            return Err(StorageError::EmptyIdentity);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM records WHERE identity = ?1",
                params![update.identity],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        // Non-null values win; null values keep what is stored
        tx.execute(
            "INSERT INTO records (
                identity, name, profession, organization, address, phone, email,
                situation_data, dossier_data, diplomas_data, personal_data,
                search_prefix, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(identity) DO UPDATE SET
                name = COALESCE(excluded.name, records.name),
                profession = COALESCE(excluded.profession, records.profession),
                organization = COALESCE(excluded.organization, records.organization),
                address = COALESCE(excluded.address, records.address),
                phone = COALESCE(excluded.phone, records.phone),
                email = COALESCE(excluded.email, records.email),
                situation_data = COALESCE(excluded.situation_data, records.situation_data),
                dossier_data = COALESCE(excluded.dossier_data, records.dossier_data),
                diplomas_data = COALESCE(excluded.diplomas_data, records.diplomas_data),
                personal_data = COALESCE(excluded.personal_data, records.personal_data),
                search_prefix = COALESCE(excluded.search_prefix, records.search_prefix),
                updated_at = excluded.updated_at",
            params![
                update.identity,
                update.name,
                update.profession,
                update.organization,
                update.address,
                update.phone,
                update.email,
                update.situation_data,
                update.dossier_data,
                update.diplomas_data,
                update.personal_data,
                update.search_prefix,
                now,
            ],
        )?;

        tx.commit()?;

        Ok(if exists {
            UpsertOutcome::Duplicate
        } else {
            UpsertOutcome::New
        })
    }
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
                Self::run_from_row,
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
                Self::run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Records =====

    fn get_record(&self, identity: &str) -> StorageResult<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT identity, name, profession, organization, address, phone, email,
                 situation_data, dossier_data, diplomas_data, personal_data,
                 search_prefix, created_at, updated_at
                 FROM records WHERE identity = ?1",
                params![identity],
                |row| {
                    Ok(StoredRecord {
                        identity: row.get(0)?,
                        name: row.get(1)?,
                        profession: row.get(2)?,
                        organization: row.get(3)?,
                        address: row.get(4)?,
                        phone: row.get(5)?,
                        email: row.get(6)?,
                        situation_data: row.get(7)?,
                        dossier_data: row.get(8)?,
                        diplomas_data: row.get(9)?,
                        personal_data: row.get(10)?,
                        search_prefix: row.get(11)?,
                        created_at: row.get(12)?,
                        updated_at: row.get(13)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_complete_records(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records
             WHERE situation_data IS NOT NULL AND dossier_data IS NOT NULL
               AND diplomas_data IS NOT NULL AND personal_data IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_records_by_prefix(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(search_prefix, ''), COUNT(*)
             FROM records
             GROUP BY search_prefix
             ORDER BY search_prefix",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn recent_records(&self, limit: u32) -> StorageResult<Vec<(Option<String>, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, search_prefix FROM records ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ===== Frontier Persistence =====

    fn upsert_frontier_state(
        &mut self,
        run_id: i64,
        prefix: &str,
        state: PrefixState,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO frontier (run_id, prefix, state, seq)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), -1) + 1 FROM frontier WHERE run_id = ?1))
             ON CONFLICT(run_id, prefix) DO UPDATE SET state = excluded.state",
            params![run_id, prefix, state.to_db_string()],
        )?;
        Ok(())
    }

    fn save_frontier_states(
        &mut self,
        run_id: i64,
        entries: &[FrontierEntry],
    ) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO frontier (run_id, prefix, state, seq)
                 VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), -1) + 1 FROM frontier WHERE run_id = ?1))
                 ON CONFLICT(run_id, prefix) DO UPDATE SET state = excluded.state",
            )?;
            for entry in entries {
                stmt.execute(params![run_id, entry.prefix, entry.state.to_db_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<FrontierEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT prefix, state FROM frontier WHERE run_id = ?1 ORDER BY seq ASC")?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(prefix, state_str)| {
                let state = PrefixState::from_db_string(&state_str)
                    .ok_or(StorageError::UnknownState(state_str))?;
                Ok(FrontierEntry { prefix, state })
            })
            .collect()
    }

    // ===== Prefix Metrics =====

    fn record_prefix_result(
        &mut self,
        run_id: i64,
        result: &PrefixResultRecord,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO prefix_results
             (run_id, prefix, records_found, records_stored, pages, error, children,
              elapsed_ms, worker_id, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                result.prefix,
                result.records_found as i64,
                result.records_stored as i64,
                result.pages,
                result.error,
                result.children,
                result.elapsed_ms as i64,
                result.worker_id,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_prefix_results(&self, run_id: i64) -> StorageResult<Vec<PrefixResultRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT prefix, records_found, records_stored, pages, error, children,
             elapsed_ms, worker_id
             FROM prefix_results WHERE run_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(PrefixResultRecord {
                    prefix: row.get(0)?,
                    records_found: row.get::<_, i64>(1)? as u64,
                    records_stored: row.get::<_, i64>(2)? as u64,
                    pages: row.get(3)?,
                    error: row.get(4)?,
                    children: row.get(5)?,
                    elapsed_ms: row.get::<_, i64>(6)? as u64,
                    worker_id: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn get_failed_prefixes(&self, run_id: i64) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT prefix, error FROM prefix_results
             WHERE run_id = ?1 AND error IS NOT NULL
             ORDER BY prefix",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
