//! Scheduler integration tests
//!
//! Drive the scheduler with scripted readiness and a recording launcher on
//! a paused clock. The last tests put the caching readiness monitor between
//! a scripted prober and the scheduler.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use umbra_crawler::config::{ReadinessConfig, SchedulerConfig};
use umbra_crawler::readiness::{Prober, ReadinessSnapshot};
use umbra_crawler::scheduler::{CrawlLauncher, ReadinessSource, SmartCrawlScheduler};
use umbra_crawler::{CrawlSummary, NetworkType, ProxyReadinessMonitor, Readiness};

/// Answers from a per-network script, then `fallback` once it runs out
struct ScriptedReadiness {
    scripts: Mutex<HashMap<NetworkType, VecDeque<bool>>>,
    fallback: bool,
}

impl ScriptedReadiness {
    fn always(ready: bool) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: ready,
        }
    }

    fn scripted(network: NetworkType, script: &[bool], fallback: bool) -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(network, script.iter().copied().collect());
        Self {
            scripts: Mutex::new(scripts),
            fallback,
        }
    }
}

#[async_trait]
impl ReadinessSource for ScriptedReadiness {
    async fn readiness(&self, network: NetworkType) -> ReadinessSnapshot {
        let ready = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&network)
            .and_then(|script| script.pop_front())
            .unwrap_or(self.fallback);
        let readiness = if ready {
            Readiness::ready(network, "scripted")
        } else {
            Readiness::warning(network, "scripted")
        };
        // Every answer is a new check
        let now = Instant::now();
        ReadinessSnapshot {
            readiness,
            consecutive_ready: u32::from(ready),
            checked_at: now,
            expires_at: now,
        }
    }
}

#[derive(Default)]
struct RecordingLauncher {
    launches: Mutex<Vec<(NetworkType, Instant)>>,
    session_length: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    panic_on: Option<NetworkType>,
}

impl RecordingLauncher {
    fn launches_for(&self, network: NetworkType) -> usize {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == network)
            .count()
    }
}

fn empty_summary() -> CrawlSummary {
    CrawlSummary {
        total: 0,
        successful: 0,
        failed: 0,
        results: Vec::new(),
        per_network: BTreeMap::new(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
    }
}

#[async_trait]
impl CrawlLauncher for RecordingLauncher {
    async fn launch(&self, network: NetworkType) -> CrawlSummary {
        self.launches.lock().unwrap().push((network, Instant::now()));
        if self.panic_on == Some(network) {
            panic!("crawl session blew up");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.session_length).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        empty_summary()
    }
}

fn config(networks: &[NetworkType], required: u32, min_interval_secs: u64) -> SchedulerConfig {
    SchedulerConfig {
        networks: networks.to_vec(),
        poll_interval_secs: 30,
        required_consecutive_checks: required,
        min_crawl_interval_secs: min_interval_secs,
    }
}

/// Runs the scheduler for `duration`, then stops it and waits for it to return
async fn run_for(
    readiness: Arc<dyn ReadinessSource>,
    launcher: Arc<RecordingLauncher>,
    config: SchedulerConfig,
    duration: Duration,
) -> umbra_crawler::scheduler::SchedulerReport {
    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = SmartCrawlScheduler::new(readiness, launcher, config);
    let handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

    tokio::time::sleep(duration).await;
    stop_tx.send(true).unwrap();
    handle.await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_debounce_never_triggers() {
    let readiness = Arc::new(ScriptedReadiness::scripted(
        NetworkType::Tor,
        &[true, true, false, true, true],
        false,
    ));
    let launcher = Arc::new(RecordingLauncher::default());

    // Polls at 0s..120s: ready, ready, not ready, ready, ready
    let report = run_for(
        readiness,
        launcher.clone(),
        config(&[NetworkType::Tor], 3, 900),
        Duration::from_secs(125),
    )
    .await;

    assert_eq!(report.started(NetworkType::Tor), 0);
    assert_eq!(launcher.launches_for(NetworkType::Tor), 0);
}

#[tokio::test(start_paused = true)]
async fn test_three_consecutive_ready_trigger_exactly_one_session() {
    let readiness = Arc::new(ScriptedReadiness::scripted(
        NetworkType::Tor,
        &[true, true, false, true, true, true],
        true,
    ));
    let launcher = Arc::new(RecordingLauncher::default());

    let report = run_for(
        readiness,
        launcher.clone(),
        config(&[NetworkType::Tor], 3, 900),
        Duration::from_secs(185),
    )
    .await;

    assert_eq!(report.started(NetworkType::Tor), 1);
    assert_eq!(report.completed(NetworkType::Tor), 1);

    let launches = launcher.launches.lock().unwrap();
    assert_eq!(launches.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_limits_sessions_within_interval() {
    let start = Instant::now();
    let readiness = Arc::new(ScriptedReadiness::always(true));
    let launcher = Arc::new(RecordingLauncher::default());

    // Two full trigger windows fit in 600s, but the interval is 900s
    let report = run_for(
        readiness.clone(),
        launcher.clone(),
        config(&[NetworkType::I2p], 3, 900),
        Duration::from_secs(605),
    )
    .await;
    assert_eq!(report.started(NetworkType::I2p), 1);

    // Past the interval the next ready poll crawls again
    let launcher = Arc::new(RecordingLauncher::default());
    let report = run_for(
        readiness,
        launcher.clone(),
        config(&[NetworkType::I2p], 3, 900),
        Duration::from_secs(1205),
    )
    .await;
    assert_eq!(report.started(NetworkType::I2p), 2);

    let launches = launcher.launches.lock().unwrap();
    assert!(launches[1].1 - launches[0].1 >= Duration::from_secs(900));
    assert!(launches[0].1 >= start);
}

#[tokio::test(start_paused = true)]
async fn test_networks_crawl_concurrently_one_session_each() {
    let start = Instant::now();
    let readiness = Arc::new(ScriptedReadiness::always(true));
    let launcher = Arc::new(RecordingLauncher {
        session_length: Duration::from_secs(300),
        ..RecordingLauncher::default()
    });

    let report = run_for(
        readiness,
        launcher.clone(),
        config(&[NetworkType::Tor, NetworkType::I2p], 1, 0),
        Duration::from_secs(200),
    )
    .await;

    // Both networks started together and neither started a second session
    assert_eq!(report.started(NetworkType::Tor), 1);
    assert_eq!(report.started(NetworkType::I2p), 1);
    assert_eq!(launcher.peak.load(Ordering::SeqCst), 2);

    // Stopping waited for the in-flight sessions
    assert_eq!(report.completed(NetworkType::Tor), 1);
    assert_eq!(report.completed(NetworkType::I2p), 1);
    assert!(start.elapsed() >= Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_session_is_contained() {
    let readiness = Arc::new(ScriptedReadiness::always(true));
    let launcher = Arc::new(RecordingLauncher {
        panic_on: Some(NetworkType::Tor),
        ..RecordingLauncher::default()
    });

    let report = run_for(
        readiness,
        launcher.clone(),
        config(&[NetworkType::Tor, NetworkType::Clearnet], 1, 0),
        Duration::from_secs(45),
    )
    .await;

    // Polls at 0s and 30s; each Tor session panics, the scheduler carries on
    assert_eq!(report.started(NetworkType::Tor), 2);
    assert_eq!(report.sessions_failed.get(&NetworkType::Tor), Some(&2));
    assert_eq!(report.completed(NetworkType::Clearnet), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_prompt_when_idle() {
    let start = Instant::now();
    let readiness = Arc::new(ScriptedReadiness::always(false));
    let launcher = Arc::new(RecordingLauncher::default());

    run_for(
        readiness,
        launcher,
        config(&NetworkType::ALL, 3, 900),
        Duration::from_secs(10),
    )
    .await;

    assert!(start.elapsed() < Duration::from_secs(30));
}

/// Answers ready for its first `ready_calls` checks, then warning
struct CountedChecks {
    calls: AtomicUsize,
    ready_calls: usize,
}

impl CountedChecks {
    fn new(ready_calls: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            ready_calls,
        }
    }
}

#[async_trait]
impl Prober for CountedChecks {
    async fn probe(&self, network: NetworkType) -> Readiness {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.ready_calls {
            Readiness::ready(network, "counted")
        } else {
            Readiness::warning(network, "counted")
        }
    }
}

/// Bootstrap TTL of 60s against a 30s poll: every other poll hits the cache
fn caching_monitor(checks: Arc<CountedChecks>) -> Arc<ProxyReadinessMonitor> {
    Arc::new(ProxyReadinessMonitor::new(checks, ReadinessConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn test_cached_ready_verdict_is_not_a_second_check() {
    let checks = Arc::new(CountedChecks::new(1));
    let launcher = Arc::new(RecordingLauncher::default());

    // Polls at 0s, 30s (cached), 60s (refreshed, not ready), 90s (cached)
    let report = run_for(
        caching_monitor(checks.clone()),
        launcher.clone(),
        config(&[NetworkType::Tor], 2, 0),
        Duration::from_secs(100),
    )
    .await;

    assert_eq!(checks.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.started(NetworkType::Tor), 0);
    assert_eq!(launcher.launches_for(NetworkType::Tor), 0);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_waits_for_fresh_checks_through_cache() {
    let start = Instant::now();
    let checks = Arc::new(CountedChecks::new(usize::MAX));

    // Only two real checks (0s, 60s) happen within 100s
    let launcher = Arc::new(RecordingLauncher::default());
    let report = run_for(
        caching_monitor(checks.clone()),
        launcher,
        config(&[NetworkType::I2p], 3, 900),
        Duration::from_secs(100),
    )
    .await;
    assert_eq!(report.started(NetworkType::I2p), 0);

    // The third real check at 120s starts the session
    let launcher = Arc::new(RecordingLauncher::default());
    let resumed = Instant::now();
    let report = run_for(
        caching_monitor(checks),
        launcher.clone(),
        config(&[NetworkType::I2p], 3, 900),
        Duration::from_secs(125),
    )
    .await;
    assert_eq!(report.started(NetworkType::I2p), 1);

    let launches = launcher.launches.lock().unwrap();
    let delay = launches[0].1 - resumed;
    assert!(delay >= Duration::from_secs(120) && delay < Duration::from_secs(150));
    assert!(resumed >= start + Duration::from_secs(100));
}
