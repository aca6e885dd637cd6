//! Sumi-Crawl main entry point
//!
//! This is the command-line interface for the Sumi-Crawl crawl engine.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_crawl::config::load_config_with_hash;
use sumi_crawl::{Crawler, CrawlerOptions, EndReason, Links};
use tracing_subscriber::EnvFilter;

/// Sumi-Crawl: A polite web crawler
///
/// Sumi-Crawl crawls websites from the given seeds while respecting
/// robots.txt and per-host crawl delays. Press Ctrl-C to stop a crawl early.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawl")]
#[command(version)]
#[command(about = "A polite web crawler", long_about = None)]
struct Cli {
    /// Path to TOML options file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URLs to start crawling from
    #[arg(value_name = "SEEDS")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate options and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading options from: {}", cli.config.display());
    let (options, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load options from {}", cli.config.display()))?;
    tracing::info!("Options loaded successfully (hash: {})", hash);

    if cli.dry_run {
        print_dry_run(&options, &cli.seeds);
        return Ok(());
    }

    if cli.seeds.is_empty() {
        bail!("No seed URLs given");
    }

    let crawler = Crawler::with_default_extender(options)?;

    let interrupt = crawler.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping crawl");
            interrupt.interrupt();
        }
    });

    let reason = crawler.run(Links::from(cli.seeds)).await;
    match reason {
        EndReason::Error => bail!("Crawl ended after a worker task was aborted"),
        _ => tracing::info!("Crawl finished: {}", reason),
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawl=info,warn"),
            1 => EnvFilter::new("sumi_crawl=debug,info"),
            2 => EnvFilter::new("sumi_crawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective options and seeds
fn print_dry_run(options: &CrawlerOptions, seeds: &[String]) {
    println!("=== Sumi-Crawl Dry Run ===\n");

    println!("Crawler Options:");
    println!("  User agent: {}", options.user_agent);
    println!("  Robots agent: {}", options.robot_user_agent);
    match options.visit_budget() {
        Some(max) => println!("  Max visits: {}", max),
        None => println!("  Max visits: unlimited"),
    }
    println!("  Crawl delay: {:?}", options.crawl_delay());
    println!("  Worker idle TTL: {:?}", options.worker_idle_ttl());
    println!("  Same host only: {}", options.same_host_only);
    println!("  HEAD before GET: {}", options.head_before_get);
    println!("  Normalization: {:?}", options.normalization);
    println!("  Log categories: {:?}", options.log);

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Options are valid");
}
