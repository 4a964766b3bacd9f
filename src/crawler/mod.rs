//! Crawler module for prefix-driven directory crawling
//!
//! This module contains the core crawling logic, including:
//! - The frontier of search prefixes and its dedup set
//! - The expansion policy that splits truncated prefixes
//! - The fetcher contract and its HTTP implementation
//! - HTML extraction of result cards and detail tabs
//! - The single-prefix drain and the worker-pool coordinator

mod coordinator;
mod drain;
mod expansion;
mod fetcher;
mod frontier;
mod parser;
mod portal;

pub use coordinator::Coordinator;
pub use drain::{drain_prefix, DrainSettings};
pub use expansion::{Evaluation, ExpansionPolicy};
pub use fetcher::{
    DetailContext, FetchError, Fetcher, FetcherFactory, PageOutcome, RecordSummary, SearchHandle,
};
pub use frontier::Frontier;
pub use parser::{extract_tab_content, extract_token, parse_result_cards};
pub use portal::{build_http_client, HttpFetcher, HttpFetcherFactory};

use crate::prefix::Prefix;
use crate::storage::PrefixResultRecord;
use std::time::Duration;

/// Outcome of draining one prefix
///
/// Created per dispatch, folded into the frontier by the expansion policy,
/// then appended to the run's metrics log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixResult {
    pub prefix: Prefix,

    /// Cards seen across all pages, repeats included; drives expansion
    pub records_found: u64,

    /// Distinct records upserted by this drain
    pub records_stored: u64,

    /// Result pages that returned records
    pub pages: u32,

    /// Why the drain stopped early, if it did
    pub error: Option<String>,

    pub elapsed: Duration,
    pub worker_id: u32,
}

impl PrefixResult {
    /// An empty, successful result
    pub fn new(prefix: Prefix, worker_id: u32) -> Self {
        Self {
            prefix,
            records_found: 0,
            records_stored: 0,
            pages: 0,
            error: None,
            elapsed: Duration::ZERO,
            worker_id,
        }
    }

    /// A result with zero records and an error marker
    pub fn failed(prefix: Prefix, worker_id: u32, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(prefix, worker_id)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Converts to the persisted metrics row
    ///
    /// # Arguments
    ///
    /// * `children` - Number of children queued because of this result
    pub fn to_record(&self, children: usize) -> PrefixResultRecord {
        PrefixResultRecord {
            prefix: self.prefix.as_str().to_string(),
            records_found: self.records_found,
            records_stored: self.records_stored,
            pages: self.pages,
            error: self.error.clone(),
            children: children as u32,
            elapsed_ms: self.elapsed.as_millis() as u64,
            worker_id: self.worker_id,
        }
    }
}
