//! Crawl orchestration
//!
//! Fans site crawls out to a bounded worker pool, one worker per site, and
//! aggregates the outcomes. A failing or panicking site crawl is recorded
//! and never takes the others down.

use crate::config::Config;
use crate::crawler::site::{NetworkCrawler, SiteCrawlReport, SiteCrawler};
use crate::storage::{ContentStore, SiteRepository, SiteStatus};
use crate::url::{classify_network, normalize_url, NetworkType};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of one seed in a session
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOutcome {
    pub url: String,
    pub network: NetworkType,
    pub success: bool,
    pub detail: String,
    /// Absent when the crawl never ran or panicked
    pub report: Option<SiteCrawlReport>,
}

impl SiteOutcome {
    fn failure(url: &str, network: NetworkType, detail: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            network,
            success: false,
            detail: detail.into(),
            report: None,
        }
    }

    fn from_report(report: SiteCrawlReport) -> Self {
        Self {
            url: report.url.clone(),
            network: report.network,
            success: report.success,
            detail: report.detail(),
            report: Some(report),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkTally {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Aggregated result of one crawl session
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// One entry per dispatched seed, in input order
    pub results: Vec<SiteOutcome>,
    pub per_network: BTreeMap<NetworkType, NetworkTally>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlSummary {
    fn from_outcomes(results: Vec<SiteOutcome>, started_at: DateTime<Utc>) -> Self {
        let mut per_network: BTreeMap<NetworkType, NetworkTally> = BTreeMap::new();
        for outcome in &results {
            let tally = per_network.entry(outcome.network).or_default();
            tally.total += 1;
            if outcome.success {
                tally.successful += 1;
            } else {
                tally.failed += 1;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
            per_network,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

pub struct CrawlOrchestrator {
    crawlers: HashMap<NetworkType, Arc<dyn SiteCrawler>>,
    repository: Arc<dyn SiteRepository>,
    seeds: Vec<String>,
    max_concurrent: usize,
    error_backoff: Duration,
}

/// Doublings of the error backoff stop here
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Wait before an errored site is retried: `base` doubled per extra failure
fn error_backoff(base: Duration, error_count: u32) -> Duration {
    let doublings = error_count.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    base.saturating_mul(1 << doublings)
}

impl CrawlOrchestrator {
    /// Creates an orchestrator with no crawlers; see [`Self::with_crawler`]
    pub fn new(repository: Arc<dyn SiteRepository>, max_concurrent: usize) -> Self {
        Self {
            crawlers: HashMap::new(),
            repository,
            seeds: Vec::new(),
            max_concurrent: max_concurrent.max(1),
            error_backoff: Duration::ZERO,
        }
    }

    /// Creates an orchestrator with a `NetworkCrawler` for every network
    pub fn from_config(
        config: &Config,
        repository: Arc<dyn SiteRepository>,
        content: Arc<dyn ContentStore>,
        seeds: Vec<String>,
    ) -> Self {
        NetworkType::ALL.iter().fold(
            Self::new(repository.clone(), config.crawler.max_concurrent_crawlers)
                .with_seeds(seeds)
                .with_error_backoff(Duration::from_secs(config.scheduler.min_crawl_interval_secs)),
            |orchestrator, network| {
                orchestrator.with_crawler(Arc::new(NetworkCrawler::new(
                    *network,
                    config,
                    repository.clone(),
                    content.clone(),
                )))
            },
        )
    }

    /// Registers the crawler for its network, replacing any previous one
    pub fn with_crawler(mut self, crawler: Arc<dyn SiteCrawler>) -> Self {
        self.crawlers.insert(crawler.network(), crawler);
        self
    }

    /// Seeds used by [`Self::crawl_network`]
    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Base wait before [`Self::crawl_network`] retries a site in error
    pub fn with_error_backoff(mut self, base: Duration) -> Self {
        self.error_backoff = base;
        self
    }

    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    /// Crawls every URL once, at most `max_concurrent` sites at a time
    pub async fn crawl_all(&self, urls: &[String]) -> CrawlSummary {
        let started_at = Utc::now();
        let urls = dedup(urls);
        tracing::info!(
            sites = urls.len(),
            workers = self.max_concurrent,
            "Starting crawl session"
        );

        let mut outcomes: Vec<Option<SiteOutcome>> = vec![None; urls.len()];
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let network = classify_network(url);
            let Some(crawler) = self.crawlers.get(&network).cloned() else {
                tracing::warn!(url = %url, %network, "No crawler configured");
                outcomes[index] = Some(SiteOutcome::failure(
                    url,
                    network,
                    format!("no crawler configured for network {}", network),
                ));
                continue;
            };

            let permits = permits.clone();
            let url = url.clone();
            workers.spawn(async move {
                let _permit = permits.acquire_owned().await;
                // A nested task turns a panic into a JoinError we can attribute
                let seed = url.clone();
                let crawl = tokio::spawn(async move { crawler.crawl_site(&seed).await });
                let outcome = match crawl.await {
                    Ok(report) => SiteOutcome::from_report(report),
                    Err(e) => {
                        tracing::error!(url = %url, %network, "Site crawl panicked: {}", e);
                        SiteOutcome::failure(&url, network, format!("crawl task failed: {}", e))
                    }
                };
                (index, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!("Crawl worker failed: {}", e),
            }
        }

        let results = outcomes
            .into_iter()
            .zip(urls.iter())
            .map(|(outcome, url)| {
                outcome.unwrap_or_else(|| {
                    SiteOutcome::failure(url, classify_network(url), "crawl worker lost")
                })
            })
            .collect();

        let summary = CrawlSummary::from_outcomes(results, started_at);
        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            elapsed_secs = summary.duration().num_seconds(),
            "Crawl session finished"
        );
        summary
    }

    /// One session for one network: its seeds plus known sites
    ///
    /// Active and pending sites are always included. Sites in error come
    /// back once their backoff since the last attempt has elapsed.
    pub async fn crawl_network(&self, network: NetworkType) -> CrawlSummary {
        let mut urls: Vec<String> = self
            .seeds
            .iter()
            .filter(|seed| classify_network(seed) == network)
            .cloned()
            .collect();

        let now = Utc::now();
        for status in [SiteStatus::Active, SiteStatus::Pending, SiteStatus::Error] {
            match self.repository.list_sites_by_network(network, Some(status)) {
                Ok(sites) => urls.extend(
                    sites
                        .into_iter()
                        .filter(|site| {
                            site.status != SiteStatus::Error
                                || !site.crawled_within(
                                    error_backoff(self.error_backoff, site.error_count),
                                    now,
                                )
                        })
                        .map(|site| site.url),
                ),
                Err(e) => tracing::warn!(
                    %network,
                    status = status.to_db_string(),
                    "Failed to list known sites: {}",
                    e
                ),
            }
        }

        self.crawl_all(&urls).await
    }
}

/// Drops repeated URLs, comparing normalized forms, keeping first occurrences
fn dedup(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .filter(|url| {
            let key = normalize_url(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string());
            seen.insert(key)
        })
        .map(str::to_string)
        .collect()
}
