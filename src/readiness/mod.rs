//! Proxy readiness for the anonymity networks
//!
//! This module decides whether a network's proxy can carry a crawl:
//! - Probing the Tor SOCKS port and routing a request through it
//! - Tiered I2P checks (proxy port, in-network test sites, internal proxies)
//! - Caching verdicts with a TTL that adapts to bootstrap and health

mod monitor;
mod probes;

pub use monitor::ProxyReadinessMonitor;
pub use probes::{bounded_probe, tcp_probe, Prober, ProxyProber};

use crate::url::NetworkType;
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

/// Verdict of a readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStatus {
    /// The network can carry a crawl
    Ready,
    /// The proxy answers but end-to-end routing is unproven
    Warning,
    /// The proxy is unreachable or the check failed outright
    Error,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one readiness check of one network
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub network: NetworkType,
    pub status: ReadinessStatus,
    /// The local proxy port accepted a connection
    pub connectivity: bool,
    pub ready_for_crawling: bool,
    /// Human-readable explanation of the verdict
    pub detail: String,
    /// Internal proxies that answered (I2P only)
    pub active_proxies: usize,
    /// In-network test sites that answered (I2P only)
    pub external_ok: usize,
}

impl Readiness {
    pub fn ready(network: NetworkType, detail: impl Into<String>) -> Self {
        Self::with_status(network, ReadinessStatus::Ready, true, detail)
    }

    pub fn warning(network: NetworkType, detail: impl Into<String>) -> Self {
        Self::with_status(network, ReadinessStatus::Warning, true, detail)
    }

    pub fn error(network: NetworkType, detail: impl Into<String>) -> Self {
        Self::with_status(network, ReadinessStatus::Error, false, detail)
    }

    fn with_status(
        network: NetworkType,
        status: ReadinessStatus,
        connectivity: bool,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            network,
            status,
            connectivity,
            ready_for_crawling: status == ReadinessStatus::Ready,
            detail: detail.into(),
            active_proxies: 0,
            external_ok: 0,
        }
    }

    pub fn with_counts(mut self, active_proxies: usize, external_ok: usize) -> Self {
        self.active_proxies = active_proxies;
        self.external_ok = external_ok;
        self
    }
}

/// A cached readiness verdict
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessSnapshot {
    pub readiness: Readiness,
    /// Ready verdicts in a row, including this one
    pub consecutive_ready: u32,
    pub checked_at: Instant,
    pub expires_at: Instant,
}

impl ReadinessSnapshot {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Combined verdict over several networks
#[derive(Debug, Clone, PartialEq)]
pub struct OverallReadiness {
    /// True when every required network is ready
    pub ready: bool,
    pub networks: BTreeMap<NetworkType, ReadinessSnapshot>,
}
