use crate::url::NetworkType;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Umbra
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Site crawl behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of site crawls in flight at once
    pub max_concurrent_crawlers: usize,

    /// Maximum number of pages visited per site crawl
    pub max_links_per_page: usize,

    /// Delay between two requests to the same site (milliseconds)
    pub crawl_delay_ms: u64,

    /// Clearnet request timeout; proxied networks use their own
    pub request_timeout_secs: u64,

    /// Attempts per request, including the first one
    pub max_retries: u32,

    /// Base delay of the exponential backoff (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Skip sites crawled within this many hours
    pub skip_recent_hours: Option<u64>,

    /// Largest HTML body read per page (bytes)
    pub max_page_bytes: u64,

    /// Honor robots.txt on crawled sites
    pub respect_robots: bool,

    /// Default seed list, overridable on the command line
    pub seed_file: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_crawlers: 8,
            max_links_per_page: 500,
            crawl_delay_ms: 1000,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            skip_recent_hours: Some(24),
            max_page_bytes: 5 * 1024 * 1024,
            respect_robots: true,
            seed_file: None,
        }
    }
}

/// Longest accepted skip window, ten years
pub(crate) const MAX_SKIP_RECENT_HOURS: u64 = 10 * 365 * 24;

impl CrawlerConfig {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn skip_recent(&self) -> Option<Duration> {
        self.skip_recent_hours
            .filter(|hours| *hours > 0)
            .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
    }
}

/// Media download limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MediaConfig {
    /// Largest media payload that will be downloaded (bytes)
    pub max_media_bytes: u64,

    /// Media items considered per page
    pub max_media_per_page: usize,

    /// Upper bound on stored bytes per decoded pixel
    pub max_bytes_per_pixel: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_media_bytes: 10 * 1024 * 1024,
            max_media_per_page: 20,
            max_bytes_per_pixel: 6.0,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    pub crawler_name: String,
    pub crawler_version: String,
    pub contact_url: String,
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where crawl output is persisted
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Root directory of the content-addressed blob store
    pub content_dir: String,
}

/// Proxy endpoints for the anonymity networks
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub tor: TorProxyConfig,
    #[serde(default)]
    pub i2p: I2pProxyConfig,
}

impl ProxyConfig {
    /// Request timeout for crawls on the given network
    pub fn request_timeout(&self, network: NetworkType, crawler: &CrawlerConfig) -> Duration {
        let secs = match network {
            NetworkType::Clearnet => crawler.request_timeout_secs,
            NetworkType::Tor => self.tor.request_timeout_secs,
            NetworkType::I2p => self.i2p.request_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TorProxyConfig {
    pub host: String,
    /// SOCKS port
    pub port: u16,
    /// Endpoint that reports whether a request arrived over Tor
    pub check_url: String,
    pub request_timeout_secs: u64,
}

impl Default for TorProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9050,
            check_url: "https://check.torproject.org/api/ip".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl TorProxyConfig {
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct I2pProxyConfig {
    pub host: String,
    /// HTTP proxy port
    pub port: u16,
    /// Long-lived in-network sites used to prove end-to-end routing
    pub test_sites: Vec<String>,
    /// Companion internal proxies (`host:port`) whose liveness is counted
    pub internal_proxies: Vec<String>,
    /// Internal proxies that must respond before the network counts as ready
    pub min_active_proxies: usize,
    pub request_timeout_secs: u64,
}

impl Default for I2pProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4444,
            test_sites: vec![
                "http://stats.i2p/".to_string(),
                "http://reg.i2p/".to_string(),
                "http://identiguy.i2p/".to_string(),
            ],
            internal_proxies: Vec::new(),
            min_active_proxies: 5,
            request_timeout_secs: 90,
        }
    }
}

impl I2pProxyConfig {
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Readiness probing and caching policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReadinessConfig {
    /// Uptime during which proxies are assumed to still be bootstrapping
    pub bootstrap_window_secs: u64,
    /// Cache lifetime of a verdict during bootstrap
    pub bootstrap_ttl_secs: u64,
    /// Cache lifetime of a healthy verdict after bootstrap
    pub steady_ttl_secs: u64,
    /// Upper bound on the cache lifetime of a warning/error verdict
    pub degraded_ttl_secs: u64,
    /// Budget for a whole network check
    pub probe_timeout_secs: u64,
    /// Budget for a single connect or request inside a check
    pub per_test_timeout_secs: u64,
    /// Simultaneous tests during the internal proxy fan-out
    pub probe_concurrency: usize,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            bootstrap_window_secs: 30 * 60,
            bootstrap_ttl_secs: 60,
            steady_ttl_secs: 300,
            degraded_ttl_secs: 120,
            probe_timeout_secs: 45,
            per_test_timeout_secs: 10,
            probe_concurrency: 8,
        }
    }
}

/// Readiness-driven scheduling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SchedulerConfig {
    /// Networks the continuous scheduler manages
    pub networks: Vec<NetworkType>,
    pub poll_interval_secs: u64,
    /// Consecutive ready observations needed before a crawl starts
    pub required_consecutive_checks: u32,
    /// Minimum time between two crawl sessions of one network
    pub min_crawl_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            networks: NetworkType::ALL.to_vec(),
            poll_interval_secs: 30,
            required_consecutive_checks: 3,
            min_crawl_interval_secs: 15 * 60,
        }
    }
}
