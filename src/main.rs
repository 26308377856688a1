//! Pagewalk main entry point
//!
//! This is the command-line interface for the Pagewalk crawler.

use anyhow::Context;
use clap::Parser;
use pagewalk::config::{load_config_with_hash, validate, Config};
use pagewalk::crawler::{crawl, seed_pages};
use pagewalk::output::{load_statistics, print_statistics, write_markdown_summary, CrawlSummary};
use pagewalk::storage::{find_resumable_run, SqliteStorage};
use pagewalk::CrawlPhase;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit code when the crawl was cancelled after some pages failed
const EXIT_CANCELLED_WITH_FAILURES: u8 = 2;

/// Pagewalk: a polite paginated crawler
///
/// Pagewalk walks the pagination chains of the configured sites under a
/// bounded concurrency budget, extracts records with CSS selector rules, and
/// stores them in SQLite. Interrupted crawls resume from their last
/// checkpoint.
#[derive(Parser, Debug)]
#[command(name = "pagewalk")]
#[command(version)]
#[command(about = "A polite paginated crawler with structured extraction", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Crawl only this site (repeatable; default: all sites)
    #[arg(long = "site", value_name = "ID")]
    sites: Vec<String>,

    /// Override the global concurrency budget
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume the last unfinished run and fail if there is none
    /// (without this flag an unfinished run is still resumed when one exists)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a new run, ignoring any checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::debug!("Configuration hash: {}", config_hash);

    config.select_sites(&cli.sites)?;
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
        validate(&config).context("Invalid --concurrency override")?;
    }

    if cli.dry_run {
        handle_dry_run(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.resume {
        ensure_resumable(&config)?;
    }

    handle_crawl(&config, &config_hash, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("pagewalk=info,warn"),
                1 => EnvFilter::new("pagewalk=debug,info"),
                2 => EnvFilter::new("pagewalk=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Pagewalk Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency budget: {}", config.crawler.concurrency);
    println!("  Checkpoint interval: {} pages", config.crawler.checkpoint_interval);

    println!("\nFetch:");
    println!("  Timeout: {}ms", config.fetch.timeout_ms);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms max",
        config.fetch.backoff_base_ms, config.fetch.backoff_max_ms
    );
    println!("  Per-host concurrency: {}", config.fetch.per_host_concurrency);
    println!("  Respect robots.txt: {}", config.fetch.respect_robots);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    let mut total = 0;
    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        let seeds = seed_pages(site)?;
        total += seeds.len();

        let cap = site
            .max_pages
            .map_or_else(|| "no page cap".to_string(), |n| format!("max {} pages", n));
        println!(
            "  - {} ({} fields, {})",
            site.id,
            site.selectors.fields.len(),
            cap
        );
        for seed in &seeds {
            println!("    * page {}: {}", seed.page_number(), seed.url());
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed pages", total);

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Fails unless the database holds an unfinished run with a checkpoint
fn ensure_resumable(config: &Config) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    match find_resumable_run(&storage)? {
        Some((run, _)) => {
            tracing::debug!("Run #{} can be resumed", run.id);
            Ok(())
        }
        None => anyhow::bail!(
            "No unfinished run to resume in {} (use --fresh to start a new one)",
            config.output.database_path
        ),
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, fresh: bool) -> anyhow::Result<ExitCode> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous checkpoints)");
    } else {
        tracing::info!("Starting crawl (will resume an unfinished run if one exists)");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            on_signal.cancel();
        }
    });

    let summary = crawl(config, config_hash, fresh, cancel).await?;

    if let Some(path) = &config.output.summary_path {
        write_markdown_summary(&summary, Path::new(path))
            .with_context(|| format!("Failed to write summary to {}", path))?;
        tracing::info!("Summary written to {}", path);
    }

    Ok(exit_code(&summary))
}

fn exit_code(summary: &CrawlSummary) -> ExitCode {
    match summary.phase {
        CrawlPhase::Cancelled if summary.pages_failed > 0 => {
            ExitCode::from(EXIT_CANCELLED_WITH_FAILURES)
        }
        _ => ExitCode::SUCCESS,
    }
}
