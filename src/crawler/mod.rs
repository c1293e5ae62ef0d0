//! Crawler module for site fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching through the network's proxy, with retry
//! - HTML parsing and link, text and media extraction
//! - Media download and validation
//! - The per-site pipeline and the worker pool that runs many of them

mod fetcher;
mod media;
mod orchestrator;
mod parser;
mod seeds;
mod site;

pub use fetcher::{build_http_client, configure_proxy, fetch_page, FetchError, FetchedPage};
pub use media::{download_capped, validate_image, MediaError, ValidatedMedia};
pub use orchestrator::{CrawlOrchestrator, CrawlSummary, NetworkTally, SiteOutcome};
pub use parser::{content_hash, parse_html, ParsedPage};
pub use seeds::{load_seeds, parse_seeds};
pub use site::{NetworkCrawler, SiteCrawlReport, SiteCrawler};
