//! Scheduler module for readiness-gated crawling
//!
//! This module decides when each network gets crawled:
//! - Debouncing readiness over consecutive fresh checks
//! - Enforcing a minimum interval between sessions of one network
//! - Running at most one session per network at a time

mod smart;
mod tracker;

pub use smart::{CrawlLauncher, ReadinessSource, SchedulerReport, SmartCrawlScheduler};
pub use tracker::{Decision, NetworkState, NetworkTracker};

use crate::crawler::{CrawlOrchestrator, CrawlSummary};
use crate::readiness::{ProxyReadinessMonitor, ReadinessSnapshot};
use crate::url::NetworkType;
use async_trait::async_trait;

#[async_trait]
impl ReadinessSource for ProxyReadinessMonitor {
    async fn readiness(&self, network: NetworkType) -> ReadinessSnapshot {
        self.get_cached_or_refresh(network).await
    }
}

#[async_trait]
impl CrawlLauncher for CrawlOrchestrator {
    async fn launch(&self, network: NetworkType) -> CrawlSummary {
        self.crawl_network(network).await
    }
}
