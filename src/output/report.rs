//! End-of-run report
//!
//! A [`CrawlReport`] is rebuilt from the run's persisted metrics log, so the
//! report printed when a crawl finishes and the one exported later with
//! `--export-report` are the same document.

use crate::storage::{PrefixResultRecord, RunStatus, Storage};
use crate::SweepError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] SweepError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A prefix that was split into children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionEvent {
    pub prefix: String,
    pub records_found: u64,
    pub children: u32,
}

/// Structured summary of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,

    /// Records in the database when the report was built
    pub total_records: u64,

    /// Every drain outcome, in completion order
    pub prefixes: Vec<PrefixResultRecord>,
}

impl CrawlReport {
    /// Loads the report of a run from storage
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend holding the run
    /// * `run_id` - The run to report on
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The assembled report
    /// * `Err(SweepError)` - The run does not exist or a query failed
    pub fn load(storage: &dyn Storage, run_id: i64) -> Result<Self, SweepError> {
        let run = storage.get_run(run_id)?;
        let prefixes = storage.get_prefix_results(run_id)?;
        let total_records = storage.count_records()?;

        Ok(Self {
            run_id: run.id,
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
            config_hash: run.config_hash,
            total_records,
            prefixes,
        })
    }

    /// Loads the report of the most recent run, if any
    pub fn load_latest(storage: &dyn Storage) -> Result<Option<Self>, SweepError> {
        match storage.get_latest_run()? {
            Some(run) => Ok(Some(Self::load(storage, run.id)?)),
            None => Ok(None),
        }
    }

    /// Prefixes that were split, with their child counts
    pub fn expansions(&self) -> Vec<ExpansionEvent> {
        self.prefixes
            .iter()
            .filter(|p| p.children > 0)
            .map(|p| ExpansionEvent {
                prefix: p.prefix.clone(),
                records_found: p.records_found,
                children: p.children,
            })
            .collect()
    }

    /// Prefixes whose drain ended with an error
    pub fn failed_prefixes(&self) -> Vec<&PrefixResultRecord> {
        self.prefixes.iter().filter(|p| p.error.is_some()).collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.prefixes.len() - self.failed_prefixes().len()
    }

    /// Cards seen across all drains (a record found by several prefixes counts each time)
    pub fn records_found(&self) -> u64 {
        self.prefixes.iter().map(|p| p.records_found).sum()
    }

    /// Summed time workers spent draining
    pub fn drain_time(&self) -> Duration {
        Duration::from_millis(self.prefixes.iter().map(|p| p.elapsed_ms).sum())
    }

    /// Wall-clock duration of the run, once it has finished
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at.parse::<DateTime<Utc>>().ok()?;
        let finished = self.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
        (finished - started).to_std().ok()
    }

    /// Prints the report to stdout
    pub fn print(&self) {
        println!("=== Sweep Report (run {}) ===\n", self.run_id);

        println!("Status: {}", self.status.to_db_string());
        if let Some(duration) = self.duration() {
            println!("Duration: {:.1}s", duration.as_secs_f64());
        }
        println!("Drain time (all workers): {:.1}s", self.drain_time().as_secs_f64());
        println!();

        println!("Overview:");
        println!("  Records in database: {}", self.total_records);
        println!("  Cards seen this run: {}", self.records_found());
        println!(
            "  Prefixes drained: {} ({} ok, {} failed)",
            self.prefixes.len(),
            self.succeeded_count(),
            self.failed_prefixes().len()
        );
        println!();

        let expansions = self.expansions();
        if !expansions.is_empty() {
            println!("Expansions ({}):", expansions.len());
            for event in &expansions {
                println!(
                    "  {} ({} records) -> {} children",
                    event.prefix, event.records_found, event.children
                );
            }
            println!();
        }

        let failed = self.failed_prefixes();
        if !failed.is_empty() {
            println!("Failed prefixes ({}):", failed.len());
            for prefix in &failed {
                println!(
                    "  {}: {}",
                    prefix.prefix,
                    prefix.error.as_deref().unwrap_or_default()
                );
            }
            println!();
            let names: Vec<_> = failed.iter().map(|p| p.prefix.as_str()).collect();
            println!("Re-run with: --prefix {}", names.join(" --prefix "));
        }
    }
}
