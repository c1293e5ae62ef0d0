//! Umbra: a multi-network crawler for clearnet, Tor and I2P
//!
//! This crate crawls sites reachable directly, through a Tor SOCKS proxy, or
//! through an I2P HTTP proxy. Anonymity-network crawls are gated on proxy
//! readiness so slow-bootstrapping proxies don't waste crawl sessions.

pub mod config;
pub mod crawler;
pub mod output;
pub mod readiness;
pub mod retry;
pub mod robots;
pub mod scheduler;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Crate-level errors, raised while loading the seed list
#[derive(Debug, Error)]
pub enum UmbraError {
    #[error("Seed file not found: {0}")]
    SeedsMissing(String),

    #[error("Seed file contains no URLs: {0}")]
    SeedsEmpty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Umbra operations
pub type Result<T> = std::result::Result<T, UmbraError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlSummary, NetworkCrawler, SiteCrawler};
pub use readiness::{ProxyReadinessMonitor, Readiness, ReadinessStatus};
pub use scheduler::SmartCrawlScheduler;
pub use url::{classify_network, extract_domain, normalize_url, NetworkType};
