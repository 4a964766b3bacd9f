//! Markdown report generation
//!
//! This module renders a [`CrawlReport`] as a human-readable markdown file:
//! run metadata, totals, expansion events, per-prefix outcomes and the list
//! of failed prefixes to re-run.

use crate::output::report::{CrawlReport, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `report` - The run report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run report as markdown
pub fn format_markdown_report(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Directory Sweep Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", report.run_id));
    md.push_str(&format!("- **Started**: {}\n", report.started_at));
    if let Some(finished) = &report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = report.duration() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration.as_secs(),
            duration.as_secs_f64() / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", report.status.to_db_string()));
    md.push_str(&format!("- **Config Hash**: {}\n\n", report.config_hash));

    // Totals
    let failed = report.failed_prefixes();
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Records in Database**: {}\n",
        report.total_records
    ));
    md.push_str(&format!("- **Cards Seen**: {}\n", report.records_found()));
    md.push_str(&format!(
        "- **Prefixes Drained**: {}\n",
        report.prefixes.len()
    ));
    md.push_str(&format!("- **Failed Prefixes**: {}\n", failed.len()));
    md.push_str(&format!(
        "- **Drain Time**: {:.1} seconds\n\n",
        report.drain_time().as_secs_f64()
    ));

    // Expansion events
    let expansions = report.expansions();
    if !expansions.is_empty() {
        md.push_str("## Expansions\n\n");
        md.push_str("| Prefix | Records | Children |\n");
        md.push_str("|--------|---------|----------|\n");
        for event in &expansions {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                event.prefix, event.records_found, event.children
            ));
        }
        md.push('\n');
    }

    // Per-prefix outcomes
    if !report.prefixes.is_empty() {
        md.push_str("## Prefixes\n\n");
        md.push_str("| Prefix | Found | Stored | Pages | Worker | Time (ms) | Outcome |\n");
        md.push_str("|--------|-------|--------|-------|--------|-----------|---------|\n");
        for prefix in &report.prefixes {
            let outcome = match &prefix.error {
                Some(_) => "failed",
                None if prefix.children > 0 => "expanded",
                None => "ok",
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                prefix.prefix,
                prefix.records_found,
                prefix.records_stored,
                prefix.pages,
                prefix.worker_id,
                prefix.elapsed_ms,
                outcome
            ));
        }
        md.push('\n');
    }

    // Failed prefixes, for a manual re-run
    if !failed.is_empty() {
        md.push_str("## Failed Prefixes\n\n");
        for prefix in &failed {
            md.push_str(&format!(
                "- `{}`: {}\n",
                prefix.prefix,
                prefix.error.as_deref().unwrap_or_default()
            ));
        }
        md.push('\n');
    }

    md
}
