//! Output module for run reports and database statistics
//!
//! This module handles:
//! - Building the structured end-of-run report from the metrics log
//! - Exporting that report as markdown
//! - Summarising the record database for `--stats`

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use report::{CrawlReport, ExpansionEvent, OutputError, OutputResult};
pub use stats::{load_statistics, print_statistics, SweepStatistics};
