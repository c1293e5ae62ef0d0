//! Per-site crawl pipeline
//!
//! One `NetworkCrawler` per network; the variants differ only in the proxy
//! their HTTP clients go through. A site crawl is breadth-first over the
//! seed's host and runs sequentially with a delay between requests.

use crate::config::{Config, CrawlerConfig, MediaConfig, UserAgentConfig};
use crate::crawler::fetcher::{build_http_client, configure_proxy, fetch_page, FetchError, FetchedPage};
use crate::crawler::media::{download_capped, validate_image, MediaError};
use crate::crawler::parser::{content_hash, parse_html, ParsedPage};
use crate::retry::RetryPolicy;
use crate::robots::{fetch_robots, ParsedRobots};
use crate::storage::{
    media_path, page_path, ContentStore, NewMedia, NewPage, SiteRecord, SiteRepository,
    SiteStatus, StorageError, StorageResult,
};
use crate::url::{classify_network, extract_domain, normalize_url, site_key, NetworkType};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// `raw` as it will be requested: parsed, fragment dropped, otherwise untouched
fn request_url(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Longest robots.txt Crawl-delay honored
const MAX_ROBOTS_DELAY: Duration = Duration::from_secs(60);

/// What a single site crawl did
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCrawlReport {
    pub url: String,
    pub network: NetworkType,
    pub success: bool,
    /// Crawled recently enough that nothing was fetched
    pub skipped: bool,
    pub pages_fetched: usize,
    pub pages_stored: usize,
    pub pages_unchanged: usize,
    pub pages_failed: usize,
    pub pages_disallowed: usize,
    pub media_stored: usize,
    pub media_rejected: usize,
    pub sites_discovered: usize,
    pub error: Option<String>,
}

impl SiteCrawlReport {
    pub fn new(url: impl Into<String>, network: NetworkType) -> Self {
        Self {
            url: url.into(),
            network,
            success: false,
            skipped: false,
            pages_fetched: 0,
            pages_stored: 0,
            pages_unchanged: 0,
            pages_failed: 0,
            pages_disallowed: 0,
            media_stored: 0,
            media_rejected: 0,
            sites_discovered: 0,
            error: None,
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// One-line description for summaries
    pub fn detail(&self) -> String {
        if self.skipped {
            return "skipped: crawled recently".to_string();
        }
        if let Some(error) = &self.error {
            return error.clone();
        }
        format!(
            "{} pages fetched ({} stored, {} unchanged, {} failed), {} media stored",
            self.pages_fetched,
            self.pages_stored,
            self.pages_unchanged,
            self.pages_failed,
            self.media_stored
        )
    }
}

/// Crawls one site on one network
#[async_trait]
pub trait SiteCrawler: Send + Sync {
    fn network(&self) -> NetworkType;

    /// Crawls the site `seed` belongs to. Failures are reported, never raised.
    async fn crawl_site(&self, seed: &str) -> SiteCrawlReport;
}

pub struct NetworkCrawler {
    network: NetworkType,
    crawler: CrawlerConfig,
    media: MediaConfig,
    user_agent: UserAgentConfig,
    proxy_url: Option<String>,
    request_timeout: Duration,
    retry: RetryPolicy,
    repository: Arc<dyn SiteRepository>,
    content: Arc<dyn ContentStore>,
}

impl NetworkCrawler {
    pub fn new(
        network: NetworkType,
        config: &Config,
        repository: Arc<dyn SiteRepository>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            network,
            crawler: config.crawler.clone(),
            media: config.media.clone(),
            user_agent: config.user_agent.clone(),
            proxy_url: configure_proxy(network, &config.proxy),
            request_timeout: config.proxy.request_timeout(network, &config.crawler),
            retry: RetryPolicy::new(
                config.crawler.max_retries,
                Duration::from_millis(config.crawler.retry_base_delay_ms),
            ),
            repository,
            content,
        }
    }

    /// Proxy this crawler's requests go through
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    /// Routes requests through `proxy_url` instead of the configured proxy
    pub fn configure_proxy(&mut self, proxy_url: Option<String>) {
        self.proxy_url = proxy_url;
    }

    /// A fresh client, owned by one site crawl
    pub fn build_client(&self) -> Result<Client, reqwest::Error> {
        build_http_client(&self.user_agent, self.proxy_url(), self.request_timeout)
    }

    /// Fetches a page with bounded retry on transient failures
    pub async fn fetch(&self, client: &Client, url: &Url) -> Result<FetchedPage, FetchError> {
        let max_bytes = self.crawler.max_page_bytes;
        self.retry
            .run(FetchError::is_retryable, move || fetch_page(client, url, max_bytes))
            .await
    }

    /// Runs a synchronous storage call under the retry policy
    async fn stored<T>(&self, op: impl Fn() -> StorageResult<T>) -> StorageResult<T> {
        self.retry
            .run(StorageError::is_transient, || {
                let result = op();
                async move { result }
            })
            .await
    }

    async fn resolve_site(&self, url: &Url) -> StorageResult<SiteRecord> {
        let repo = &self.repository;
        if let Some(site) = self.stored(|| repo.find_site_by_url(url.as_str())).await? {
            return Ok(site);
        }

        let domain = extract_domain(url).unwrap_or_default();
        match self
            .stored(|| repo.create_site(url.as_str(), &domain, self.network))
            .await
        {
            Ok(site) => Ok(site),
            // Created concurrently by another worker
            Err(StorageError::ConstraintViolation(_)) => self
                .stored(|| repo.find_site_by_url(url.as_str()))
                .await?
                .ok_or_else(|| StorageError::SiteNotFound(url.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn crawl(&self, seed: &str, mut report: SiteCrawlReport) -> SiteCrawlReport {
        let seed_url = match normalize_url(seed) {
            Ok(url) => url,
            Err(e) => return report.failed(format!("invalid seed URL: {}", e)),
        };
        let Some(key) = site_key(&seed_url) else {
            return report.failed("seed URL has no host");
        };
        let Some(seed_request) = request_url(seed) else {
            return report.failed("invalid seed URL");
        };

        let mut site = match self.resolve_site(&seed_url).await {
            Ok(site) => site,
            Err(e) => return report.failed(format!("site record unavailable: {}", e)),
        };

        if let Some(window) = self.crawler.skip_recent() {
            if site.crawled_within(window, Utc::now()) {
                tracing::info!(url = %seed_url, network = %self.network, "Skipping recently crawled site");
                report.success = true;
                report.skipped = true;
                return report;
            }
        }

        let last_failure = match self.build_client() {
            Ok(client) => {
                let seed = (seed_request, seed_url.clone());
                self.crawl_pages(&client, &site, seed, &key, &mut report).await
            }
            Err(e) => Some(format!("failed to build HTTP client: {}", e)),
        };

        // Bookkeeping happens whatever the outcome
        site.last_crawled = Some(Utc::now());
        if report.pages_fetched > 0 {
            site.crawl_count = site.crawl_count.saturating_add(1);
            site.error_count = 0;
            site.status = SiteStatus::Active;
            site.last_error = None;
            report.success = true;
        } else {
            let message = format!(
                "no page could be fetched: {}",
                last_failure.unwrap_or_else(|| "nothing to crawl".to_string())
            );
            site.error_count = site.error_count.saturating_add(1);
            site.status = SiteStatus::Error;
            site.last_error = Some(message.clone());
            report.success = false;
            report.error = Some(message);
        }

        let repo = &self.repository;
        if let Err(e) = self.stored(|| repo.update_site(&site)).await {
            return report.failed(format!("failed to update site record: {}", e));
        }

        report
    }

    /// Breadth-first traversal of one site; returns the last per-URL failure
    ///
    /// Frontier entries pair the URL as requested with its normalized form.
    /// Deduplication and page records use the normalized form; the server
    /// only ever sees the request URL.
    async fn crawl_pages(
        &self,
        client: &Client,
        site: &SiteRecord,
        seed: (Url, Url),
        key: &str,
        report: &mut SiteCrawlReport,
    ) -> Option<String> {
        let agent = self.user_agent.crawler_name.as_str();
        let robots = if self.crawler.respect_robots {
            fetch_robots(client, &seed.0).await
        } else {
            ParsedRobots::allow_all()
        };
        let delay = robots
            .crawl_delay(agent)
            .map(|d| d.min(MAX_ROBOTS_DELAY))
            .map_or(self.crawler.crawl_delay(), |d| d.max(self.crawler.crawl_delay()));

        let limit = self.crawler.max_links_per_page;
        let mut queued: HashSet<String> = HashSet::from([seed.1.to_string()]);
        let mut frontier = VecDeque::from([seed]);
        let mut registered: HashSet<String> = HashSet::new();
        let mut visited = 0usize;
        let mut last_failure = None;

        while let Some((url, normalized)) = frontier.pop_front() {
            if visited >= limit {
                break;
            }
            if !robots.is_allowed(&url, agent) {
                tracing::debug!(url = %url, "Disallowed by robots.txt");
                report.pages_disallowed += 1;
                last_failure = Some(format!("{} disallowed by robots.txt", url));
                continue;
            }

            if visited > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            visited += 1;

            let page = match self.fetch(client, &url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(url = %url, network = %self.network, "Fetch failed: {}", e);
                    report.pages_failed += 1;
                    last_failure = Some(e.to_string());
                    continue;
                }
            };
            report.pages_fetched += 1;

            let parsed = parse_html(&page.body, &page.url);
            if let Err(e) = self
                .process_page(client, site, &normalized, &page, &parsed, report)
                .await
            {
                tracing::warn!(url = %url, "Failed to store page: {}", e);
            }

            for link in &parsed.links {
                let Ok(normalized) = normalize_url(link.as_str()) else {
                    continue;
                };
                if site_key(&normalized).as_deref() == Some(key) {
                    if queued.len() < limit && queued.insert(normalized.to_string()) {
                        let mut request = link.clone();
                        request.set_fragment(None);
                        frontier.push_back((request, normalized));
                    }
                } else if classify_network(normalized.as_str()) == self.network
                    && registered.len() < limit
                {
                    self.register_site(&normalized, &mut registered, report).await;
                }
            }
        }

        tracing::info!(
            key,
            network = %self.network,
            fetched = report.pages_fetched,
            stored = report.pages_stored,
            unchanged = report.pages_unchanged,
            failed = report.pages_failed,
            "Site crawl finished"
        );
        last_failure
    }

    /// Stores a fetched page unless its content is unchanged
    async fn process_page(
        &self,
        client: &Client,
        site: &SiteRecord,
        url: &Url,
        page: &FetchedPage,
        parsed: &ParsedPage,
        report: &mut SiteCrawlReport,
    ) -> StorageResult<()> {
        let repo = &self.repository;
        let store = &self.content;
        let hash = content_hash(&parsed.text);

        let known = self
            .stored(|| repo.find_pages_by_site_and_hash(site.id, &hash))
            .await?;
        if known.iter().any(|p| p.url == url.as_str()) {
            tracing::debug!(url = %url, "Content unchanged");
            report.pages_unchanged += 1;
            return Ok(());
        }

        let path = page_path(&hash);
        let locator = if self.stored(|| store.exists(&path)).await? {
            path
        } else {
            self.stored(|| store.put(&path, parsed.text.as_bytes(), "text/plain; charset=utf-8"))
                .await?
        };

        let new_page = NewPage {
            site_id: site.id,
            url: url.to_string(),
            title: parsed.title.clone(),
            content_hash: hash,
            storage_path: locator,
            status_code: page.status_code,
            response_time_ms: page.response_time.as_millis() as u64,
        };
        let page_id = self.stored(|| repo.create_page(&new_page)).await?;
        report.pages_stored += 1;

        for media_url in parsed.media.iter().take(self.media.max_media_per_page) {
            match self.store_media(client, page_id, media_url).await {
                Ok(true) => report.media_stored += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(url = %media_url, "Media rejected: {}", e);
                    report.media_rejected += 1;
                }
            }
        }

        Ok(())
    }

    /// Downloads, validates and stores one image; false if already known
    async fn store_media(&self, client: &Client, page_id: i64, url: &Url) -> Result<bool, MediaError> {
        let repo = &self.repository;
        let store = &self.content;

        if self.stored(|| repo.find_media_by_url(url.as_str())).await?.is_some() {
            return Ok(false);
        }

        let limit = self.media.max_media_bytes;
        let bytes = self
            .retry
            .run(MediaError::is_retryable, move || download_capped(client, url, limit))
            .await?;
        let media = validate_image(bytes, &self.media)?;

        let path = media_path(&media.hash, media.extension);
        let content_type = format!("image/{}", media.extension);
        let locator = if self.stored(|| store.exists(&path)).await? {
            path
        } else {
            self.stored(|| store.put(&path, &media.bytes, &content_type))
                .await?
        };

        let record = NewMedia {
            page_id,
            url: url.to_string(),
            file_type: media.extension.to_string(),
            file_hash: media.hash.clone(),
            storage_path: locator,
            size_bytes: media.bytes.len() as u64,
            width: media.width,
            height: media.height,
        };
        match self.stored(|| repo.create_media(&record)).await {
            Ok(_) => Ok(true),
            // Another worker stored the same URL first
            Err(StorageError::ConstraintViolation(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Records another site on this network so a later session can crawl it
    async fn register_site(
        &self,
        link: &Url,
        registered: &mut HashSet<String>,
        report: &mut SiteCrawlReport,
    ) {
        let mut root = link.clone();
        root.set_path("/");
        root.set_query(None);
        let Ok(root) = normalize_url(root.as_str()) else {
            return;
        };
        if !registered.insert(root.to_string()) {
            return;
        }

        let repo = &self.repository;
        let domain = extract_domain(&root).unwrap_or_default();
        let result = match self.stored(|| repo.find_site_by_url(root.as_str())).await {
            Ok(Some(_)) => return,
            Ok(None) => self
                .stored(|| repo.create_site(root.as_str(), &domain, self.network))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::debug!(url = %root, network = %self.network, "Registered discovered site");
                report.sites_discovered += 1;
            }
            Err(StorageError::ConstraintViolation(_)) => {}
            Err(e) => tracing::warn!(url = %root, "Failed to register discovered site: {}", e),
        }
    }
}

#[async_trait]
impl SiteCrawler for NetworkCrawler {
    fn network(&self) -> NetworkType {
        self.network
    }

    async fn crawl_site(&self, seed: &str) -> SiteCrawlReport {
        let report = SiteCrawlReport::new(seed, self.network);
        let report = self.crawl(seed, report).await;
        if report.success {
            tracing::debug!(url = seed, network = %self.network, "{}", report.detail());
        } else {
            tracing::warn!(url = seed, network = %self.network, "Site crawl failed: {}", report.detail());
        }
        report
    }
}
