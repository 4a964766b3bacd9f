//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Merge-preserving record upserts
//! - Run tracking and resumption support
//! - Persisted frontier states and the per-prefix metrics log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RecordStore, Storage, StorageError, StorageResult};

use crate::state::PrefixState;
use crate::SweepError;

use std::path::Path;
use std::time::Duration;

/// Opens (or creates) the record database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `busy_timeout` - How long a writer waits for a lock held by another connection
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SweepError)` - Failed to initialize storage
pub fn open_storage(path: &Path, busy_timeout: Duration) -> Result<SqliteStorage, SweepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::new(path, busy_timeout)
}

/// A partial record update
///
/// `None` means "not known by this update"; it never clears a stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub identity: String,
    pub name: Option<String>,
    pub profession: Option<String>,
    pub organization: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub situation_data: Option<String>,
    pub dossier_data: Option<String>,
    pub diplomas_data: Option<String>,
    pub personal_data: Option<String>,
    /// Prefix whose search produced this update
    pub search_prefix: Option<String>,
}

impl RecordUpdate {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with this identity existed before
    New,
    /// An existing record was merged with the update
    Duplicate,
}

/// A record as stored in the database
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub identity: String,
    pub name: Option<String>,
    pub profession: Option<String>,
    pub organization: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub situation_data: Option<String>,
    pub dossier_data: Option<String>,
    pub diplomas_data: Option<String>,
    pub personal_data: Option<String>,
    pub search_prefix: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredRecord {
    /// True when all four detail tabs were captured
    pub fn has_complete_detail(&self) -> bool {
        self.situation_data.is_some()
            && self.dossier_data.is_some()
            && self.diplomas_data.is_some()
            && self.personal_data.is_some()
    }
}

/// One persisted prefix drain outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixResultRecord {
    pub prefix: String,
    pub records_found: u64,
    pub records_stored: u64,
    pub pages: u32,
    pub error: Option<String>,
    /// Children enqueued because of this result
    pub children: u32,
    pub elapsed_ms: u64,
    pub worker_id: u32,
}

/// A prefix and its state in a run's frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub prefix: String,
    pub state: PrefixState,
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
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Runs that stopped before their frontier was exhausted
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}
