//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full site crawl and orchestration cycle end-to-end.

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageOutputFormat, RgbImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use umbra_crawler::config::{
    Config, CrawlerConfig, MediaConfig, ProxyConfig, ReadinessConfig, SchedulerConfig,
    StorageConfig, UserAgentConfig,
};
use umbra_crawler::crawler::{
    content_hash, load_seeds, parse_html, CrawlOrchestrator, NetworkCrawler, SiteCrawlReport,
    SiteCrawler,
};
use umbra_crawler::storage::{
    ContentStore, FsContentStore, SiteRepository, SiteStatus, SqliteRepository,
};
use umbra_crawler::{NetworkType, UmbraError};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration that crawls fast and never skips
fn create_test_config(dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_crawlers: 4,
            max_links_per_page: 500,
            crawl_delay_ms: 0,
            request_timeout_secs: 5,
            max_retries: 3,
            retry_base_delay_ms: 10,
            skip_recent_hours: None,
            max_page_bytes: 1024 * 1024,
            respect_robots: false,
            seed_file: None,
        },
        media: MediaConfig::default(),
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: dir.join("umbra.db").display().to_string(),
            content_dir: dir.join("content").display().to_string(),
        },
        proxy: ProxyConfig::default(),
        readiness: ReadinessConfig::default(),
        scheduler: SchedulerConfig::default(),
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    config: Config,
    repository: Arc<SqliteRepository>,
    content: Arc<FsContentStore>,
}

impl Harness {
    fn new(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        adjust(&mut config);
        let repository =
            Arc::new(SqliteRepository::new(Path::new(&config.storage.database_path)).unwrap());
        let content = Arc::new(FsContentStore::new(&config.storage.content_dir).unwrap());
        Self {
            _dir: dir,
            config,
            repository,
            content,
        }
    }

    fn crawler(&self) -> NetworkCrawler {
        NetworkCrawler::new(
            NetworkType::Clearnet,
            &self.config,
            self.repository.clone(),
            self.content.clone(),
        )
    }

    /// Number of blobs under `pages/`
    fn page_blobs(&self) -> usize {
        count_files(&Path::new(&self.config.storage.content_dir).join("pages"))
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

fn html_page(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 200])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

/// The key a site is stored under
fn site_url(server: &MockServer) -> String {
    format!("{}/", server.uri())
}

#[tokio::test]
async fn test_crawl_follows_same_site_links_and_registers_others() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><head><title>Home</title></head><body>
            <p>Welcome home</p>
            <a href="/page1">Page 1</a>
            <a href="/page2#section">Page 2</a>
            <a href="/page1">Page 1 again</a>
            <a href="http://other.example.com/deep/link">Elsewhere</a>
            <a href="http://hidden.onion/">Another network</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html_page("<html><body><p>First page</p></body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html_page("<html><body><p>Second page</p></body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.pages_stored, 3);
    assert_eq!(report.sites_discovered, 1);
    assert_eq!(request_count(&server).await, 3);

    let site = harness
        .repository
        .find_site_by_url(&site_url(&server))
        .unwrap()
        .unwrap();
    assert_eq!(site.status, SiteStatus::Active);
    assert_eq!(site.crawl_count, 1);
    assert!(site.last_crawled.is_some());

    // Same network: registered as pending, not followed
    let other = harness
        .repository
        .find_site_by_url("http://other.example.com/")
        .unwrap()
        .unwrap();
    assert_eq!(other.status, SiteStatus::Pending);
    assert_eq!(other.network, NetworkType::Clearnet);

    // Different network: ignored
    assert!(harness
        .repository
        .find_site_by_url("http://hidden.onion/")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_trailing_slash_urls_are_requested_as_written() {
    let server = MockServer::start().await;
    // Only the slashed spelling exists; the normalized form would 404
    Mock::given(method("GET"))
        .and(path("/docs/"))
        .respond_with(html_page(
            r#"<html><body><p>Docs index</p><a href="intro#top">Intro</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/intro"))
        .respond_with(html_page("<html><body><p>Introduction</p></body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let seed = format!("{}/docs/", server.uri());
    let report = harness.crawler().crawl_site(&seed).await;

    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.pages_failed, 0);

    let requested: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(requested, vec!["/docs/", "/docs/intro"]);

    // Records still use the normalized spelling
    let site = harness
        .repository
        .find_site_by_url(&format!("{}/docs", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(site.status, SiteStatus::Active);
}

#[tokio::test]
async fn test_frontier_is_bounded_by_max_links() {
    let server = MockServer::start().await;

    let links: String = (0..600)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(format!("<html><body>{}</body></html>", links)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html_page("<html><body><p>Leaf page</p></body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|c| c.crawler.max_links_per_page = 500);
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(report.success);
    assert_eq!(report.pages_fetched, 500);

    let requests = server.received_requests().await.unwrap();
    let unique: HashSet<String> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(requests.len(), 500);
    assert_eq!(unique.len(), 500);
}

#[tokio::test]
async fn test_identical_text_collapses_to_one_blob() {
    let server = MockServer::start().await;
    let leaf = "<html><body><p>Shared body text</p></body></html>";

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/a">a</a><a href="/b">b</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(a|b)$"))
        .respond_with(html_page(leaf))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let report = harness.crawler().crawl_site(&server.uri()).await;
    assert_eq!(report.pages_stored, 3);

    // Index text plus one shared leaf text
    assert_eq!(harness.page_blobs(), 2);

    let site = harness
        .repository
        .find_site_by_url(&site_url(&server))
        .unwrap()
        .unwrap();
    let base = url::Url::parse(&server.uri()).unwrap();
    let hash = content_hash(&parse_html(leaf, &base).text);
    let pages = harness
        .repository
        .find_pages_by_site_and_hash(site.id, &hash)
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].storage_path, pages[1].storage_path);
}

#[tokio::test]
async fn test_recrawl_of_unchanged_page_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<html><body><p>Stable content</p></body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let crawler = harness.crawler();

    let first = crawler.crawl_site(&server.uri()).await;
    assert_eq!(first.pages_stored, 1);

    let second = crawler.crawl_site(&server.uri()).await;
    assert!(second.success);
    assert_eq!(second.pages_fetched, 1);
    assert_eq!(second.pages_unchanged, 1);
    assert_eq!(second.pages_stored, 0);
    assert_eq!(harness.page_blobs(), 1);

    let site = harness
        .repository
        .find_site_by_url(&site_url(&server))
        .unwrap()
        .unwrap();
    assert_eq!(site.crawl_count, 2);
    let stats = harness.repository.statistics().unwrap();
    assert_eq!(stats.total_pages, 1);
}

async fn crawl_with_last_crawled(hours_ago: i64) -> (SiteCrawlReport, usize) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html_page("<html><body>hello</body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|c| c.crawler.skip_recent_hours = Some(24));
    let mut site = harness
        .repository
        .create_site(&site_url(&server), "127.0.0.1", NetworkType::Clearnet)
        .unwrap();
    site.last_crawled = Some(Utc::now() - chrono::Duration::hours(hours_ago));
    site.status = SiteStatus::Active;
    harness.repository.update_site(&site).unwrap();

    let report = harness.crawler().crawl_site(&server.uri()).await;
    (report, request_count(&server).await)
}

#[tokio::test]
async fn test_recently_crawled_site_is_skipped_without_network_calls() {
    let (report, requests) = crawl_with_last_crawled(1).await;
    assert!(report.success);
    assert!(report.skipped);
    assert_eq!(requests, 0);
}

#[tokio::test]
async fn test_stale_site_is_recrawled() {
    let (report, requests) = crawl_with_last_crawled(25).await;
    assert!(report.success);
    assert!(!report.skipped);
    assert_eq!(report.pages_fetched, 1);
    assert!(requests > 0);
}

#[tokio::test]
async fn test_oversized_media_is_rejected_page_still_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><p>Gallery</p>
            <img src="/big.png"><img src="/small.png"><img src="/broken.png">
            </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 8192], "image/png"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(4, 4), "image/png"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"not an image".to_vec(), "image/png"))
        .mount(&server)
        .await;

    let harness = Harness::new(|c| c.media.max_media_bytes = 4096);
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(report.success);
    assert_eq!(report.pages_stored, 1);
    assert_eq!(report.media_stored, 1);
    assert_eq!(report.media_rejected, 2);

    let base = server.uri();
    assert!(harness
        .repository
        .find_media_by_url(&format!("{}/big.png", base))
        .unwrap()
        .is_none());
    assert!(harness
        .repository
        .find_media_by_url(&format!("{}/broken.png", base))
        .unwrap()
        .is_none());

    let stored = harness
        .repository
        .find_media_by_url(&format!("{}/small.png", base))
        .unwrap()
        .unwrap();
    assert_eq!((stored.width, stored.height), (4, 4));
    assert_eq!(stored.file_type, "png");
    assert!(stored.storage_path.starts_with("media/"));
    assert_eq!(
        harness.content.get(&stored.storage_path).unwrap(),
        png_bytes(4, 4)
    );
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<html><body>eventually</body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(report.success);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_total_failure_marks_site_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(!report.success);
    assert!(report.error.is_some());
    // 404 is permanent: exactly one attempt
    assert_eq!(request_count(&server).await, 1);

    let site = harness
        .repository
        .find_site_by_url(&site_url(&server))
        .unwrap()
        .unwrap();
    assert_eq!(site.status, SiteStatus::Error);
    assert_eq!(site.error_count, 1);
    assert!(site.last_error.is_some());
    assert!(site.last_crawled.is_some());
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_not_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow: /private", "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/public">p</a><a href="/private/x">x</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_page("<html><body>public</body></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html_page("<html><body>secret</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(|c| c.crawler.respect_robots = true);
    let report = harness.crawler().crawl_site(&server.uri()).await;

    assert!(report.success);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.pages_disallowed, 1);
}

/// Succeeds after every crawler of the session has arrived
struct BarrierCrawler {
    network: NetworkType,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl SiteCrawler for BarrierCrawler {
    fn network(&self) -> NetworkType {
        self.network
    }

    async fn crawl_site(&self, seed: &str) -> SiteCrawlReport {
        self.barrier.wait().await;
        let mut report = SiteCrawlReport::new(seed, self.network);
        report.success = true;
        report
    }
}

/// Records every seed and tracks concurrency; panics on seeds containing "panic"
#[derive(Default)]
struct RecordingCrawler {
    network: Option<NetworkType>,
    seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingCrawler {
    fn on(network: NetworkType) -> Arc<Self> {
        Arc::new(Self {
            network: Some(network),
            ..Self::default()
        })
    }
}

#[async_trait]
impl SiteCrawler for RecordingCrawler {
    fn network(&self) -> NetworkType {
        self.network.unwrap_or(NetworkType::Clearnet)
    }

    async fn crawl_site(&self, seed: &str) -> SiteCrawlReport {
        self.seen.lock().unwrap().push(seed.to_string());
        if seed.contains("panic") {
            panic!("crawler bug on {}", seed);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut report = SiteCrawlReport::new(seed, self.network());
        report.success = true;
        report
    }
}

fn memory_repository() -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::new_in_memory().unwrap())
}

#[tokio::test]
async fn test_orchestrator_dispatches_networks_concurrently() {
    let barrier = Arc::new(Barrier::new(2));
    let orchestrator = CrawlOrchestrator::new(memory_repository(), 4)
        .with_crawler(Arc::new(BarrierCrawler {
            network: NetworkType::Clearnet,
            barrier: barrier.clone(),
        }))
        .with_crawler(Arc::new(BarrierCrawler {
            network: NetworkType::Tor,
            barrier,
        }));

    let seeds = vec![
        "https://example.com/".to_string(),
        "http://exampleonionaddress.onion/".to_string(),
    ];
    // Deadlocks unless both crawls run at the same time
    let summary = tokio::time::timeout(Duration::from_secs(5), orchestrator.crawl_all(&seeds))
        .await
        .expect("crawls were not dispatched concurrently");

    assert_eq!(summary.total, 2);
    assert!(summary.all_succeeded());
    assert_eq!(summary.results[0].url, seeds[0]);
    assert_eq!(summary.results[0].network, NetworkType::Clearnet);
    assert_eq!(summary.results[1].url, seeds[1]);
    assert_eq!(summary.results[1].network, NetworkType::Tor);
    assert_eq!(summary.per_network[&NetworkType::Tor].successful, 1);
}

#[tokio::test]
async fn test_orchestrator_contains_failures_and_dedups() {
    let clearnet = RecordingCrawler::on(NetworkType::Clearnet);
    let orchestrator =
        CrawlOrchestrator::new(memory_repository(), 4).with_crawler(clearnet.clone());

    let seeds = vec![
        "https://a.example/".to_string(),
        "https://panic.example/".to_string(),
        "https://A.example".to_string(),
        "http://stats.i2p/".to_string(),
        "https://b.example/".to_string(),
    ];
    let summary = orchestrator.crawl_all(&seeds).await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 2);

    // The duplicate spelling was dispatched once
    assert_eq!(clearnet.seen.lock().unwrap().len(), 3);

    let panicked = &summary.results[1];
    assert!(!panicked.success);
    assert_eq!(panicked.network, NetworkType::Clearnet);

    let unrouted = &summary.results[2];
    assert_eq!(unrouted.network, NetworkType::I2p);
    assert!(unrouted.detail.contains("no crawler configured"));
    assert_eq!(summary.per_network[&NetworkType::I2p].failed, 1);
}

#[tokio::test]
async fn test_orchestrator_worker_pool_is_bounded() {
    let crawler = RecordingCrawler::on(NetworkType::Clearnet);
    let orchestrator = CrawlOrchestrator::new(memory_repository(), 2).with_crawler(crawler.clone());

    let seeds: Vec<String> = (0..8).map(|i| format!("https://site{}.example/", i)).collect();
    let summary = orchestrator.crawl_all(&seeds).await;

    assert_eq!(summary.successful, 8);
    assert_eq!(crawler.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_crawl_network_combines_seeds_and_known_sites() {
    let repository = memory_repository();
    repository
        .create_site("http://known.onion/", "known.onion", NetworkType::Tor)
        .unwrap();
    // Failed just now: still backing off
    let mut broken = repository
        .create_site("http://broken.onion/", "broken.onion", NetworkType::Tor)
        .unwrap();
    broken.status = SiteStatus::Error;
    broken.error_count = 1;
    broken.last_crawled = Some(Utc::now());
    repository.update_site(&broken).unwrap();
    // Third failure was two hours ago; its 60 minute backoff has passed
    let mut flaky = repository
        .create_site("http://flaky.onion/", "flaky.onion", NetworkType::Tor)
        .unwrap();
    flaky.status = SiteStatus::Error;
    flaky.error_count = 3;
    flaky.last_crawled = Some(Utc::now() - chrono::Duration::hours(2));
    repository.update_site(&flaky).unwrap();

    let tor = RecordingCrawler::on(NetworkType::Tor);
    let orchestrator = CrawlOrchestrator::new(repository, 4)
        .with_error_backoff(Duration::from_secs(15 * 60))
        .with_crawler(tor.clone())
        .with_crawler(RecordingCrawler::on(NetworkType::Clearnet))
        .with_seeds(vec![
            "https://example.com/".to_string(),
            "http://seed.onion/".to_string(),
            "http://known.onion/".to_string(),
        ]);

    let summary = orchestrator.crawl_network(NetworkType::Tor).await;

    assert_eq!(summary.total, 3);
    let mut seen = tor.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec!["http://flaky.onion/", "http://known.onion/", "http://seed.onion/"]
    );
}

#[tokio::test]
async fn test_end_to_end_session_from_seed_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html_page("<html><body><p>End to end</p></body></html>"))
        .mount(&server)
        .await;

    let harness = Harness::new(|_| {});
    let seed_file = harness._dir.path().join("seeds.txt");
    std::fs::write(&seed_file, format!("# test seeds\n{}\n\n", server.uri())).unwrap();

    let seeds = load_seeds(&seed_file).unwrap();
    let orchestrator = CrawlOrchestrator::from_config(
        &harness.config,
        harness.repository.clone(),
        harness.content.clone(),
        seeds.clone(),
    );
    let summary = orchestrator.crawl_all(&seeds).await;

    assert!(summary.all_succeeded());
    assert_eq!(summary.per_network[&NetworkType::Clearnet].successful, 1);
    assert_eq!(harness.repository.statistics().unwrap().total_pages, 1);
}

#[test]
fn test_missing_seed_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_seeds(&dir.path().join("absent.txt"));
    assert!(matches!(result, Err(UmbraError::SeedsMissing(_))));
}
