//! Readiness-driven crawl scheduling
//!
//! Polls readiness for every managed network on a fixed interval and starts
//! a crawl session once a network has been ready long enough and its last
//! session is old enough. Networks crawl independently and concurrently.

use crate::config::SchedulerConfig;
use crate::crawler::CrawlSummary;
use crate::readiness::ReadinessSnapshot;
use crate::scheduler::tracker::{Decision, NetworkTracker};
use crate::url::NetworkType;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Where the scheduler gets readiness verdicts from
///
/// Sources may serve cached verdicts; `checked_at` tells the scheduler
/// whether a verdict is new since the last poll.
#[async_trait]
pub trait ReadinessSource: Send + Sync {
    async fn readiness(&self, network: NetworkType) -> ReadinessSnapshot;
}

/// Runs one crawl session for a network
#[async_trait]
pub trait CrawlLauncher: Send + Sync {
    async fn launch(&self, network: NetworkType) -> CrawlSummary;
}

/// What a scheduler run did, per network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub sessions_started: BTreeMap<NetworkType, usize>,
    pub sessions_completed: BTreeMap<NetworkType, usize>,
    /// Sessions whose task panicked
    pub sessions_failed: BTreeMap<NetworkType, usize>,
}

impl SchedulerReport {
    pub fn started(&self, network: NetworkType) -> usize {
        self.sessions_started.get(&network).copied().unwrap_or(0)
    }

    pub fn completed(&self, network: NetworkType) -> usize {
        self.sessions_completed.get(&network).copied().unwrap_or(0)
    }
}

type SessionResult = (NetworkType, Result<CrawlSummary, JoinError>);

pub struct SmartCrawlScheduler {
    readiness: Arc<dyn ReadinessSource>,
    launcher: Arc<dyn CrawlLauncher>,
    config: SchedulerConfig,
}

impl SmartCrawlScheduler {
    pub fn new(
        readiness: Arc<dyn ReadinessSource>,
        launcher: Arc<dyn CrawlLauncher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            readiness,
            launcher,
            config,
        }
    }

    /// Runs until `stop` turns true (or its sender goes away)
    ///
    /// Sessions still in flight when the stop arrives are awaited before
    /// returning.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> SchedulerReport {
        let min_interval = Duration::from_secs(self.config.min_crawl_interval_secs);
        let mut trackers: BTreeMap<NetworkType, NetworkTracker> = self
            .config
            .networks
            .iter()
            .map(|network| {
                (
                    *network,
                    NetworkTracker::new(self.config.required_consecutive_checks, min_interval),
                )
            })
            .collect();

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sessions: JoinSet<SessionResult> = JoinSet::new();
        let mut report = SchedulerReport::default();

        tracing::info!(
            networks = ?trackers.keys().collect::<Vec<_>>(),
            poll_secs = self.config.poll_interval_secs,
            "Scheduler started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.poll(&mut trackers, &mut sessions, &mut report).await;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    complete(joined, &mut trackers, &mut report);
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if !sessions.is_empty() {
            tracing::info!(in_flight = sessions.len(), "Stopping, waiting for crawl sessions");
        }
        while let Some(joined) = sessions.join_next().await {
            complete(joined, &mut trackers, &mut report);
        }

        tracing::info!("Scheduler stopped");
        report
    }

    async fn poll(
        &self,
        trackers: &mut BTreeMap<NetworkType, NetworkTracker>,
        sessions: &mut JoinSet<SessionResult>,
        report: &mut SchedulerReport,
    ) {
        let idle: Vec<NetworkType> = trackers
            .iter()
            .filter(|(_, tracker)| !tracker.is_crawling())
            .map(|(network, _)| *network)
            .collect();

        let verdicts = futures::future::join_all(
            idle.iter().map(|network| self.readiness.readiness(*network)),
        )
        .await;

        let now = Instant::now();
        for (network, snapshot) in idle.into_iter().zip(verdicts) {
            let Some(tracker) = trackers.get_mut(&network) else {
                continue;
            };

            let readiness = &snapshot.readiness;
            let before = tracker.state();
            let decision =
                tracker.observe(readiness.ready_for_crawling, snapshot.checked_at, now);
            if tracker.state() != before {
                tracing::info!(
                    %network,
                    from = %before,
                    to = %tracker.state(),
                    status = %readiness.status,
                    "{}",
                    readiness.detail
                );
            } else {
                tracing::debug!(
                    %network,
                    state = %before,
                    status = %readiness.status,
                    consecutive = tracker.consecutive_ready(),
                    "Readiness polled"
                );
            }

            if decision == Decision::StartCrawl {
                *report.sessions_started.entry(network).or_default() += 1;
                let launcher = self.launcher.clone();
                sessions.spawn(async move {
                    // Nested so a panicking session still reports its network
                    let session = tokio::spawn(async move { launcher.launch(network).await });
                    (network, session.await)
                });
            }
        }
    }
}

fn complete(
    joined: Result<SessionResult, JoinError>,
    trackers: &mut BTreeMap<NetworkType, NetworkTracker>,
    report: &mut SchedulerReport,
) {
    let (network, outcome) = match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Session supervisor failed: {}", e);
            return;
        }
    };

    if let Some(tracker) = trackers.get_mut(&network) {
        tracker.finish_crawl(Instant::now());
    }

    match outcome {
        Ok(summary) => {
            *report.sessions_completed.entry(network).or_default() += 1;
            tracing::info!(
                %network,
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "Crawl session completed"
            );
        }
        Err(e) => {
            *report.sessions_failed.entry(network).or_default() += 1;
            tracing::error!(%network, "Crawl session failed: {}", e);
        }
    }
}
