//! Directory-Sweep main entry point
//!
//! This is the command-line interface for the Directory-Sweep crawler.

use anyhow::Context;
use clap::Parser;
use directory_sweep::config::{load_config_with_hash, validate, Config};
use directory_sweep::crawler::{Coordinator, HttpFetcherFactory};
use directory_sweep::output::{
    generate_markdown_report, load_statistics, print_statistics, CrawlReport,
};
use directory_sweep::prefix::seed;
use directory_sweep::storage::open_storage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Directory-Sweep: a prefix-expanding directory crawler
///
/// Directory-Sweep searches a health-professional directory by name prefix,
/// splits any prefix whose results hit the site's retrieval ceiling, and
/// stores every record it reaches exactly once.
#[derive(Parser, Debug)]
#[command(name = "directory-sweep")]
#[command(version)]
#[command(about = "A prefix-expanding directory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh run, ignoring any interrupted one
    #[arg(long)]
    fresh: bool,

    /// Crawl only these prefixes (repeatable); implies --fresh
    #[arg(long = "prefix", value_name = "PREFIX")]
    prefixes: Vec<String>,

    /// Override the configured worker count
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Validate config and show the seed prefixes without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_report"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_report"])]
    stats: bool,

    /// Write the markdown report of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_report: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if !cli.prefixes.is_empty() {
        config.seeds.prefixes = cli.prefixes.clone();
    }
    validate(&config).context("invalid command-line override")?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_report {
        handle_export_report(&config)
    } else {
        let fresh = cli.fresh || !cli.prefixes.is_empty();
        handle_crawl(config, &config_hash, fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("directory_sweep=info,warn"),
            1 => EnvFilter::new("directory_sweep=debug,info"),
            2 => EnvFilter::new("directory_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the seed prefixes
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Directory-Sweep Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max pages per prefix: {}", config.crawler.max_pages);
    println!(
        "  Expansion threshold: {} ({} - {})",
        config
            .crawler
            .result_ceiling
            .saturating_sub(config.crawler.ceiling_margin),
        config.crawler.result_ceiling,
        config.crawler.ceiling_margin
    );
    println!("  Smart expansion: {}", config.crawler.smart_expansion);
    println!(
        "  Max records per prefix: {}",
        config.crawler.max_records_per_prefix
    );

    println!("\nDelays:");
    println!("  Between records: {}ms", config.delays.between_records_ms);
    println!("  Between tabs: {}ms", config.delays.between_tabs_ms);
    println!("  Between pages: {}ms", config.delays.between_pages_ms);
    println!(
        "  Min request interval: {}ms",
        config.delays.min_request_interval_ms
    );

    println!("\nPortal:");
    println!("  Base URL: {}", config.portal.base_url);
    println!("  User agent: {}", config.portal.user_agent);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);

    let alphabet = config.alphabet()?;
    let seeds = seed(&config.seed_plan(), &alphabet)?;
    println!("\nSeed Prefixes ({}):", seeds.len());
    let listed: Vec<_> = seeds.iter().take(50).map(|p| p.as_str()).collect();
    println!("  {}", listed.join(" "));
    if seeds.len() > 50 {
        println!("  ... and {} more", seeds.len() - 50);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(
        Path::new(&config.output.database_path),
        config.output.busy_timeout(),
    )?;
    let stats = load_statistics(&storage, 10)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-report mode: writes the latest run's markdown report
fn handle_export_report(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Sweep Report ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.report_path);
    println!();

    let storage = open_storage(
        Path::new(&config.output.database_path),
        config.output.busy_timeout(),
    )?;

    let Some(report) = CrawlReport::load_latest(&storage)? else {
        anyhow::bail!("no runs found in {}", config.output.database_path);
    };
    generate_markdown_report(&report, Path::new(&config.output.report_path))?;

    println!("✓ Report exported to: {}", config.output.report_path);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh run (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    }

    let report_path = PathBuf::from(&config.output.report_path);
    let factory =
        HttpFetcherFactory::new(config.portal.clone(), config.delays.min_request_interval());
    let mut coordinator = Coordinator::new(config, factory, config_hash, fresh)?;

    // First Ctrl-C stops dispatching; in-flight prefixes still finish
    let shutdown = coordinator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight prefixes");
            shutdown.cancel();
        }
    });

    let report = match coordinator.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    report.print();
    generate_markdown_report(&report, &report_path)?;
    tracing::info!("Report written to {}", report_path.display());

    Ok(())
}
