//! Statistics generation from the record database
//!
//! This module backs `--stats`: what a crawl has stored so far, which
//! prefixes contributed it, and which prefixes of the latest run failed.

use crate::storage::{RunStatus, Storage};
use crate::SweepError;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct SweepStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Records with all four detail tabs captured
    pub complete_records: u64,

    /// Record counts by the prefix that last touched them
    pub records_by_prefix: Vec<(String, u64)>,

    /// Most recently created records as (name, prefix)
    pub recent: Vec<(Option<String>, Option<String>)>,

    /// Latest run id and status
    pub latest_run: Option<(i64, RunStatus)>,

    /// Failed prefixes of the latest run, with their errors
    pub failed_prefixes: Vec<(String, String)>,
}

impl SweepStatistics {
    /// Share of records with complete detail, in percent
    pub fn completion_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            (self.complete_records as f64 / self.total_records as f64) * 100.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `recent_limit` - How many recent records to list
///
/// # Returns
///
/// * `Ok(SweepStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    recent_limit: u32,
) -> Result<SweepStatistics, SweepError> {
    let total_records = storage.count_records()?;
    let complete_records = storage.count_complete_records()?;
    let records_by_prefix = storage.count_records_by_prefix()?;
    let recent = storage.recent_records(recent_limit)?;

    let latest_run = storage.get_latest_run()?;
    let failed_prefixes = match &latest_run {
        Some(run) => storage.get_failed_prefixes(run.id)?,
        None => Vec::new(),
    };

    Ok(SweepStatistics {
        total_records,
        complete_records,
        records_by_prefix,
        recent,
        latest_run: latest_run.map(|run| (run.id, run.status)),
        failed_prefixes,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SweepStatistics) {
    println!("=== Sweep Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!(
        "  Complete detail: {} ({:.1}%)",
        stats.complete_records,
        stats.completion_rate()
    );
    if let Some((id, status)) = &stats.latest_run {
        println!("  Latest run: {} ({})", id, status.to_db_string());
    }
    println!();

    if !stats.records_by_prefix.is_empty() {
        println!("Records by Prefix:");
        for (prefix, count) in &stats.records_by_prefix {
            println!("  {}: {}", prefix, count);
        }
        println!();
    }

    if !stats.recent.is_empty() {
        println!("Recent Records:");
        for (name, prefix) in &stats.recent {
            println!(
                "  {} [{}]",
                name.as_deref().unwrap_or("<unnamed>"),
                prefix.as_deref().unwrap_or("-")
            );
        }
        println!();
    }

    if !stats.failed_prefixes.is_empty() {
        println!("Failed Prefixes ({}):", stats.failed_prefixes.len());
        for (prefix, error) in &stats.failed_prefixes {
            println!("  - {}: {}", prefix, error);
        }
        println!();
    }
}
