//! Umbra main entry point
//!
//! This is the command-line interface for the Umbra multi-network crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use umbra_crawler::config::{load_config_with_hash, Config};
use umbra_crawler::crawler::load_seeds;
use umbra_crawler::output::{print_crawl_summary, print_statistics, render_readiness};
use umbra_crawler::storage::{FsContentStore, SiteRepository, SqliteRepository};
use umbra_crawler::{
    classify_network, CrawlOrchestrator, NetworkType, ProxyReadinessMonitor, SmartCrawlScheduler,
};

/// Umbra: a crawler for clearnet, Tor and I2P
///
/// Crawls seed sites over the network each one lives on, routing Tor and
/// I2P traffic through their local proxies, and stores page text and
/// validated media in a content-addressed store.
#[derive(Parser, Debug)]
#[command(name = "umbra-crawler")]
#[command(version)]
#[command(about = "A multi-network crawler for clearnet, Tor and I2P", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed list, one URL per line (overrides `crawler.seed-file`)
    #[arg(long, value_name = "FILE")]
    seeds: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run the readiness-driven scheduler until interrupted
    #[arg(long, conflicts_with_all = ["check_proxies", "stats", "dry_run"])]
    schedule: bool,

    /// Probe every network's proxy once and print the verdicts
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    check_proxies: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and seeds and show what would be crawled
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        let seeds = read_seeds(&cli, &config)?;
        handle_dry_run(&config, &seeds);
        return Ok(ExitCode::SUCCESS);
    }
    if cli.check_proxies {
        return handle_check_proxies(&config).await;
    }

    let repository = open_repository(&config)?;
    if cli.stats {
        handle_stats(&config, repository.as_ref())?;
        return Ok(ExitCode::SUCCESS);
    }

    let content = Arc::new(
        FsContentStore::new(&config.storage.content_dir).with_context(|| {
            format!("cannot open content store {}", config.storage.content_dir)
        })?,
    );

    if cli.schedule {
        // Known sites alone are enough to schedule on
        let seeds = match seed_path(&cli, &config) {
            Some(_) => read_seeds(&cli, &config)?,
            None => Vec::new(),
        };
        let orchestrator = CrawlOrchestrator::from_config(&config, repository, content, seeds);
        handle_schedule(&config, orchestrator).await;
        return Ok(ExitCode::SUCCESS);
    }

    let seeds = read_seeds(&cli, &config)?;
    let orchestrator =
        CrawlOrchestrator::from_config(&config, repository, content, seeds.clone());
    Ok(handle_crawl(&orchestrator, &seeds, cli.quiet).await)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("umbra_crawler=info,warn"),
            1 => EnvFilter::new("umbra_crawler=debug,info"),
            2 => EnvFilter::new("umbra_crawler=trace,debug"),
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

fn seed_path(cli: &Cli, config: &Config) -> Option<PathBuf> {
    cli.seeds
        .clone()
        .or_else(|| config.crawler.seed_file.as_ref().map(PathBuf::from))
}

fn read_seeds(cli: &Cli, config: &Config) -> anyhow::Result<Vec<String>> {
    let Some(path) = seed_path(cli, config) else {
        bail!("no seed list given: pass --seeds or set crawler.seed-file");
    };
    let seeds = load_seeds(&path)?;
    tracing::info!("Loaded {} seed URLs from {}", seeds.len(), path.display());
    Ok(seeds)
}

fn open_repository(config: &Config) -> anyhow::Result<Arc<SqliteRepository>> {
    let path = Path::new(&config.storage.database_path);
    let repository = SqliteRepository::new(path)
        .with_context(|| format!("cannot open database {}", path.display()))?;
    repository
        .health_check()
        .with_context(|| format!("database {} is not answering", path.display()))?;
    Ok(Arc::new(repository))
}

/// Handles the --dry-run mode: shows the plan without touching the network
fn handle_dry_run(config: &Config, seeds: &[String]) {
    println!("=== Umbra Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent crawlers: {}",
        config.crawler.max_concurrent_crawlers
    );
    println!("  Max pages per site: {}", config.crawler.max_links_per_page);
    println!("  Crawl delay: {}ms", config.crawler.crawl_delay_ms);
    println!("  Attempts per request: {}", config.crawler.max_retries);
    match config.crawler.skip_recent_hours {
        Some(hours) => println!("  Skip sites crawled within: {}h", hours),
        None => println!("  Skip recently crawled sites: disabled"),
    }
    println!("  Max page size: {} bytes", config.crawler.max_page_bytes);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Content: {}", config.storage.content_dir);

    println!("\nProxies:");
    println!("  tor: {}", config.proxy.tor.proxy_url());
    println!(
        "  i2p: {} ({} test sites, {} internal proxies)",
        config.proxy.i2p.proxy_url(),
        config.proxy.i2p.test_sites.len(),
        config.proxy.i2p.internal_proxies.len()
    );

    println!("\nSeeds ({}):", seeds.len());
    for network in NetworkType::ALL {
        let matching: Vec<&String> = seeds
            .iter()
            .filter(|seed| classify_network(seed) == network)
            .collect();
        println!("  {} ({}):", network, matching.len());
        for seed in matching {
            println!("    * {}", seed);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling {} seed URLs", seeds.len());
}

/// Handles the --check-proxies mode: one readiness check per network
async fn handle_check_proxies(config: &Config) -> anyhow::Result<ExitCode> {
    let monitor = ProxyReadinessMonitor::from_config(config);
    let overall = monitor.overall_readiness(&NetworkType::ALL).await;
    print!("{}", render_readiness(&overall));
    Ok(if overall.ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, repository: &dyn SiteRepository) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);
    let stats = repository
        .statistics()
        .context("failed to load statistics")?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --schedule mode: crawls networks as they become ready
async fn handle_schedule(config: &Config, orchestrator: CrawlOrchestrator) {
    let monitor = Arc::new(ProxyReadinessMonitor::from_config(config));
    let scheduler =
        SmartCrawlScheduler::new(monitor, Arc::new(orchestrator), config.scheduler.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            // Dropping the sender would stop the scheduler
            std::future::pending::<()>().await;
        }
        tracing::info!("Interrupt received, stopping scheduler");
        let _ = stop_tx.send(true);
    });

    let report = scheduler.run(stop_rx).await;
    for network in &config.scheduler.networks {
        tracing::info!(
            %network,
            started = report.started(*network),
            completed = report.completed(*network),
            "Scheduler totals"
        );
    }
}

/// Handles the default mode: one bounded pass over the seed list
async fn handle_crawl(orchestrator: &CrawlOrchestrator, seeds: &[String], quiet: bool) -> ExitCode {
    tracing::info!("Starting crawl of {} seeds", seeds.len());
    let summary = orchestrator.crawl_all(seeds).await;

    if !quiet {
        print_crawl_summary(&summary);
    }

    if summary.all_succeeded() {
        tracing::info!("Crawl completed successfully");
        ExitCode::SUCCESS
    } else {
        tracing::warn!("{} of {} sites failed", summary.failed, summary.total);
        ExitCode::from(2)
    }
}
