//! Statistics rendering
//!
//! Formats repository aggregates, crawl session summaries and readiness
//! verdicts for the terminal.

use crate::crawler::CrawlSummary;
use crate::readiness::OverallReadiness;
use crate::storage::{RepositoryStats, SiteRepository, StorageResult};
use std::fmt::Write;

/// Loads statistics from the repository
pub fn load_statistics(repository: &dyn SiteRepository) -> StorageResult<RepositoryStats> {
    repository.statistics()
}

/// Renders repository statistics
///
/// # Arguments
///
/// * `stats` - The statistics to display
///
/// # Returns
///
/// The formatted report, one fact per line
pub fn render_statistics(stats: &RepositoryStats) -> String {
    let mut out = String::new();
    let total_sites: u64 = stats.sites_by_network.values().sum();

    let _ = writeln!(out, "=== Repository Statistics ===\n");
    let _ = writeln!(out, "Sites: {}", total_sites);
    for (network, count) in &stats.sites_by_network {
        let _ = writeln!(out, "  {}: {}", network, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Sites by Status:");
    for (status, count) in &stats.sites_by_status {
        let percentage = if total_sites > 0 {
            (*count as f64 / total_sites as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(
            out,
            "  {}: {} ({:.1}%)",
            status.to_db_string(),
            count,
            percentage
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Pages: {}", stats.total_pages);
    let _ = writeln!(out, "  Distinct contents: {}", stats.distinct_contents);
    let _ = writeln!(
        out,
        "Media: {} ({})",
        stats.total_media,
        human_bytes(stats.media_bytes)
    );
    out
}

/// Renders the outcome of a crawl session
pub fn render_crawl_summary(summary: &CrawlSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Summary ===\n");
    let _ = writeln!(
        out,
        "Sites: {} total, {} succeeded, {} failed ({}s)",
        summary.total,
        summary.successful,
        summary.failed,
        summary.duration().num_seconds()
    );

    for (network, tally) in &summary.per_network {
        let _ = writeln!(
            out,
            "  {}: {} / {} succeeded",
            network, tally.successful, tally.total
        );
    }

    let failures: Vec<_> = summary.results.iter().filter(|r| !r.success).collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailed Sites ({}):", failures.len());
        for outcome in failures {
            let _ = writeln!(out, "  - [{}] {}: {}", outcome.network, outcome.url, outcome.detail);
        }
    }
    out
}

/// Renders a readiness verdict per network
pub fn render_readiness(overall: &OverallReadiness) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Proxy Readiness ===\n");
    for (network, snapshot) in &overall.networks {
        let readiness = &snapshot.readiness;
        let _ = write!(out, "  {}: {} - {}", network, readiness.status, readiness.detail);
        if *network == crate::url::NetworkType::I2p {
            let _ = write!(
                out,
                " (test sites ok: {}, active proxies: {})",
                readiness.external_ok, readiness.active_proxies
            );
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(
        out,
        "\nReady for crawling: {}",
        if overall.ready { "yes" } else { "no" }
    );
    out
}

/// Prints repository statistics to stdout
pub fn print_statistics(stats: &RepositoryStats) {
    print!("{}", render_statistics(stats));
}

/// Prints a crawl session summary to stdout
pub fn print_crawl_summary(summary: &CrawlSummary) {
    print!("{}", render_crawl_summary(summary));
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
