//! Per-network scheduling state
//!
//! Pure bookkeeping: feed it readiness observations and crawl completions,
//! it says when to start a crawl. Time is passed in by the caller.
//!
//! Observations carry the instant their verdict was checked. A cached
//! verdict seen again on a later poll is not a new check and does not
//! advance the debounce.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    WaitingForReady,
    /// Ready, but not for enough consecutive checks yet
    ReadyDebouncing,
    /// Ready, but the last crawl is too recent
    ReadyCoolingDown,
    Crawling,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WaitingForReady => "waiting_for_ready",
            Self::ReadyDebouncing => "ready_debouncing",
            Self::ReadyCoolingDown => "ready_cooling_down",
            Self::Crawling => "crawling",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    StartCrawl,
    Hold,
}

#[derive(Debug, Clone)]
pub struct NetworkTracker {
    state: NetworkState,
    consecutive_ready: u32,
    /// Check time of the newest verdict counted
    last_checked: Option<Instant>,
    last_crawl: Option<Instant>,
    required_checks: u32,
    min_interval: Duration,
}

impl NetworkTracker {
    pub fn new(required_checks: u32, min_interval: Duration) -> Self {
        Self {
            state: NetworkState::WaitingForReady,
            consecutive_ready: 0,
            last_checked: None,
            last_crawl: None,
            required_checks: required_checks.max(1),
            min_interval,
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn is_crawling(&self) -> bool {
        self.state == NetworkState::Crawling
    }

    pub fn consecutive_ready(&self) -> u32 {
        self.consecutive_ready
    }

    /// Records a verdict checked at `checked_at` and observed at `now`
    pub fn observe(&mut self, ready: bool, checked_at: Instant, now: Instant) -> Decision {
        if self.is_crawling() {
            return Decision::Hold;
        }

        let fresh = self.last_checked.map_or(true, |last| checked_at > last);
        if fresh {
            self.last_checked = Some(checked_at);
        }

        if !ready {
            self.consecutive_ready = 0;
            self.state = NetworkState::WaitingForReady;
            return Decision::Hold;
        }

        if fresh {
            self.consecutive_ready = self.consecutive_ready.saturating_add(1);
        }
        if self.consecutive_ready < self.required_checks {
            self.state = NetworkState::ReadyDebouncing;
            return Decision::Hold;
        }

        let cooling = self
            .last_crawl
            .map_or(false, |last| now.duration_since(last) < self.min_interval);
        if cooling {
            self.state = NetworkState::ReadyCoolingDown;
            Decision::Hold
        } else {
            self.state = NetworkState::Crawling;
            Decision::StartCrawl
        }
    }

    /// Records the end of a crawl session, however it ended
    pub fn finish_crawl(&mut self, now: Instant) {
        self.last_crawl = Some(now);
        self.consecutive_ready = 0;
        self.state = NetworkState::WaitingForReady;
    }
}
