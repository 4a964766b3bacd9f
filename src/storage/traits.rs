//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::PrefixState;
use crate::storage::{
    FrontierEntry, PrefixResultRecord, RecordUpdate, RunRecord, RunStatus, StoredRecord,
    UpsertOutcome,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Record identity cannot be empty")]
    EmptyIdentity,

    #[error("Unknown prefix state in database: {0}")]
    UnknownState(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The record sink a prefix drain writes to
///
/// Each call is atomic on its own; callers never lock around it.
pub trait RecordStore {
    /// Inserts or merges a record
    ///
    /// Fields set in `update` replace stored values; fields left `None` keep
    /// whatever is stored. A later partial update can therefore never erase data.
    ///
    /// # Returns
    ///
    /// `UpsertOutcome::New` if the identity was unknown, `Duplicate` otherwise
    fn upsert_record(&mut self, update: &RecordUpdate) -> StorageResult<UpsertOutcome>;
}

/// Trait for storage backend implementations
///
/// This trait defines every database operation the coordinator and the
/// reporting commands need on top of record upserts.
pub trait Storage: RecordStore {
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

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as finished with the given terminal status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Gets a record by identity
    fn get_record(&self, identity: &str) -> StorageResult<Option<StoredRecord>>;

    /// Counts all stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records with all four detail tabs captured
    fn count_complete_records(&self) -> StorageResult<u64>;

    /// Record counts grouped by the prefix that last touched them
    fn count_records_by_prefix(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Most recently created records as `(name, search_prefix)`
    fn recent_records(&self, limit: u32) -> StorageResult<Vec<(Option<String>, Option<String>)>>;

    // ===== Frontier Persistence =====

    /// Saves the state of one prefix in a run's frontier
    fn upsert_frontier_state(
        &mut self,
        run_id: i64,
        prefix: &str,
        state: PrefixState,
    ) -> StorageResult<()>;

    /// Saves many frontier states in one transaction
    fn save_frontier_states(&mut self, run_id: i64, entries: &[FrontierEntry])
        -> StorageResult<()>;

    /// Loads every prefix the run has seen, in insertion order
    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<FrontierEntry>>;

    // ===== Prefix Metrics =====

    /// Appends a drain outcome to the run's metrics log
    fn record_prefix_result(&mut self, run_id: i64, result: &PrefixResultRecord)
        -> StorageResult<()>;

    /// Gets every drain outcome of a run, in completion order
    fn get_prefix_results(&self, run_id: i64) -> StorageResult<Vec<PrefixResultRecord>>;

    /// Gets the prefixes of a run whose drain ended with an error
    fn get_failed_prefixes(&self, run_id: i64) -> StorageResult<Vec<(String, String)>>;
}
