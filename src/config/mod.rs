//! Configuration module for Umbra
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use umbra_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("umbra.toml")).unwrap();
//! println!("Concurrent crawlers: {}", config.crawler.max_concurrent_crawlers);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, I2pProxyConfig, MediaConfig, ProxyConfig, ReadinessConfig,
    SchedulerConfig, StorageConfig, TorProxyConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
