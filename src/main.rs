//! Statehouse main entry point
//!
//! This is the command-line interface for the Statehouse legislative scraper.

use anyhow::Context;
use clap::Parser;
use statehouse::config::{load_config_with_hash, Config};
use statehouse::crawler::Coordinator;
use statehouse::output::{load_statistics, print_statistics, print_summary};
use statehouse::registry::{legislature_registry, Stage};
use statehouse::storage::{open_storage, RunStatus, RunStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Number of runs listed by --stats
const STATS_RUN_LIMIT: usize = 10;

/// Statehouse: a resumable legislative-site scraper
///
/// Statehouse crawls a legislature's website politely, extracts members,
/// committees, bills and votes, resolves the references between them, and
/// loads the results into SQLite. An interrupted crawl resumes from its
/// checkpoint.
#[derive(Parser, Debug)]
#[command(name = "statehouse")]
#[command(version)]
#[command(about = "A resumable legislative-site scraper", long_about = None)]
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

    /// Start a fresh crawl, ignoring the checkpoint and known links
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("statehouse=info,warn"),
            1 => EnvFilter::new("statehouse=debug,info"),
            2 => EnvFilter::new("statehouse=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let tz = config.crawler.tz()?;
    let registry = legislature_registry(tz);

    println!("=== Statehouse Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Minimum delay per domain: {}ms", config.crawler.min_delay_ms);
    println!("  Lookup attempts: {}", config.crawler.max_lookup_attempts);
    println!("  Strict: {}", config.crawler.strict);
    println!("  Timezone: {}", tz);

    println!("\nUser Agent:");
    println!("  {}", config.http.user_agent());
    println!(
        "  {} attempts, {}ms backoff, new session every {} requests",
        config.http.max_attempts, config.http.backoff_ms, config.http.recycle_after
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path.display());
    println!("  Checkpoint: {}", config.output.checkpoint_path.display());
    println!("  Known links: {}", config.output.known_links_path.display());

    println!("\nSessions ({}):", config.sessions.len());
    for session in &config.sessions {
        println!("  - {} ({} seeds)", session.name, session.seeds.len());
        for seed in &session.seeds {
            match registry.classify_url(seed) {
                Some(page_type) => println!("    * {} [{}]", seed, page_type),
                None => println!("    * {} [no matching route]", seed),
            }
        }
    }

    println!("\nRoutes ({}):", registry.routes().len());
    for route in registry.routes() {
        let mut stages = Vec::new();
        for stage in [Stage::Fetch, Stage::Process, Stage::Load] {
            if registry.get_processor(route.page_type, stage).is_some() {
                stages.push(stage.to_string());
            }
        }
        println!(
            "  {} -> {} ({})",
            route.pattern,
            route.page_type,
            stages.join(", ")
        );
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.sessions.iter().map(|s| s.seeds.len()).sum::<usize>()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path.display());

    let store = open_storage(&config.output.database_path)?;
    let stats = load_statistics(&store, STATS_RUN_LIMIT)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
///
/// Ctrl-C stops the crawl after saving a checkpoint, so the next run resumes
/// where this one stopped.
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let seed_count: usize = config.sessions.iter().map(|s| s.seeds.len()).sum();
    tracing::info!(
        "Sessions: {}, seed URLs: {}",
        config.sessions.len(),
        seed_count
    );

    let database_path = config.output.database_path.clone();
    let registry = legislature_registry(config.crawler.tz()?);
    let coordinator = Coordinator::new(config, registry, config_hash, fresh)?;
    let checkpointer = coordinator.checkpointer();
    let run_id = coordinator.run_id();

    tokio::select! {
        result = coordinator.run() => {
            match result {
                Ok(summary) => {
                    print_summary(&summary);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Crawl failed: {}", e);
                    Err(e.into())
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, saving checkpoint");
            checkpointer.save().context("Failed to save checkpoint")?;
            let mut store = open_storage(&database_path)?;
            store.finish_run(run_id, RunStatus::Interrupted, 0, 0)?;
            println!("Crawl interrupted; run again to resume");
            Ok(())
        }
    }
}
