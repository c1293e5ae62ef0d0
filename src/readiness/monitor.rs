//! Readiness cache
//!
//! Verdicts are cached per network with a TTL that depends on how long the
//! monitor has been up and on whether the last verdict was healthy. At most
//! one refresh per network is in flight; callers arriving during a refresh
//! get the stale verdict instead of queueing behind the probe.

use crate::config::{Config, ReadinessConfig};
use crate::readiness::probes::{Prober, ProxyProber};
use crate::readiness::{OverallReadiness, Readiness, ReadinessSnapshot};
use crate::url::NetworkType;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

pub struct ProxyReadinessMonitor {
    prober: Arc<dyn Prober>,
    config: ReadinessConfig,
    started_at: Instant,
    cache: RwLock<HashMap<NetworkType, ReadinessSnapshot>>,
    refreshing: HashMap<NetworkType, Mutex<()>>,
}

impl ProxyReadinessMonitor {
    pub fn new(prober: Arc<dyn Prober>, config: ReadinessConfig) -> Self {
        Self {
            prober,
            config,
            started_at: Instant::now(),
            cache: RwLock::new(HashMap::new()),
            refreshing: NetworkType::ALL
                .iter()
                .map(|network| (*network, Mutex::new(())))
                .collect(),
        }
    }

    /// Builds a monitor probing the proxies named in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ProxyProber::from_config(config)),
            config.readiness.clone(),
        )
    }

    /// Probes a network now, bypassing the cache
    ///
    /// The whole check runs under the probe timeout; running out of time is
    /// an error verdict, not a failure.
    pub async fn check_network(&self, network: NetworkType) -> Readiness {
        let budget = Duration::from_secs(self.config.probe_timeout_secs);
        match tokio::time::timeout(budget, self.prober.probe(network)).await {
            Ok(readiness) => readiness,
            Err(_) => Readiness::error(
                network,
                format!("readiness check timed out after {}s", budget.as_secs()),
            ),
        }
    }

    /// Returns the cached verdict while it is fresh, otherwise refreshes it
    pub async fn get_cached_or_refresh(&self, network: NetworkType) -> ReadinessSnapshot {
        let cached = self.cache.read().await.get(&network).cloned();
        if let Some(snapshot) = &cached {
            if snapshot.is_fresh(Instant::now()) {
                return snapshot.clone();
            }
        }

        let Some(lock) = self.refreshing.get(&network) else {
            return self.refresh(network).await;
        };

        let _guard = match (lock.try_lock(), cached) {
            (Ok(guard), _) => guard,
            (Err(_), Some(stale)) => {
                tracing::trace!(%network, "Refresh in flight, serving stale verdict");
                return stale;
            }
            (Err(_), None) => lock.lock().await,
        };

        // Another caller may have refreshed while we waited for the lock
        if let Some(snapshot) = self.cache.read().await.get(&network) {
            if snapshot.is_fresh(Instant::now()) {
                return snapshot.clone();
            }
        }

        self.refresh(network).await
    }

    async fn refresh(&self, network: NetworkType) -> ReadinessSnapshot {
        let readiness = self.check_network(network).await;
        let now = Instant::now();
        let ttl = self.ttl_for(&readiness, now);

        let mut cache = self.cache.write().await;
        let previous = cache.get(&network).map_or(0, |s| s.consecutive_ready);
        let consecutive_ready = if readiness.ready_for_crawling {
            previous.saturating_add(1)
        } else {
            0
        };

        if cache
            .get(&network)
            .map_or(true, |s| s.readiness.status != readiness.status)
        {
            tracing::info!(
                %network,
                status = %readiness.status,
                ttl_secs = ttl.as_secs(),
                "Readiness changed: {}",
                readiness.detail
            );
        } else {
            tracing::debug!(%network, status = %readiness.status, "Readiness refreshed");
        }

        let snapshot = ReadinessSnapshot {
            readiness,
            consecutive_ready,
            checked_at: now,
            expires_at: now + ttl,
        };
        cache.insert(network, snapshot.clone());
        snapshot
    }

    /// Cache lifetime of a verdict observed at `now`
    fn ttl_for(&self, readiness: &Readiness, now: Instant) -> Duration {
        let bootstrapping = now.duration_since(self.started_at)
            < Duration::from_secs(self.config.bootstrap_window_secs);
        let base = if bootstrapping {
            Duration::from_secs(self.config.bootstrap_ttl_secs)
        } else {
            Duration::from_secs(self.config.steady_ttl_secs)
        };

        if readiness.ready_for_crawling {
            base
        } else {
            base.min(Duration::from_secs(self.config.degraded_ttl_secs))
        }
    }

    /// ANDs the verdicts of the required networks, checked concurrently
    pub async fn overall_readiness(&self, required: &[NetworkType]) -> OverallReadiness {
        let snapshots = futures::future::join_all(
            required
                .iter()
                .map(|network| self.get_cached_or_refresh(*network)),
        )
        .await;

        let ready = snapshots.iter().all(|s| s.readiness.ready_for_crawling);
        let networks = snapshots
            .into_iter()
            .map(|s| (s.readiness.network, s))
            .collect();
        OverallReadiness { ready, networks }
    }

    /// Current cache contents, without refreshing anything
    pub async fn snapshots(&self) -> BTreeMap<NetworkType, ReadinessSnapshot> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(network, snapshot)| (*network, snapshot.clone()))
            .collect()
    }

    /// Drops the cached verdict so the next read probes again
    pub async fn invalidate(&self, network: NetworkType) {
        self.cache.write().await.remove(&network);
    }
}
