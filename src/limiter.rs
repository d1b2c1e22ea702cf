//! Sliding-window rate limiter keyed by client identifier.
//!
//! Each identifier owns the timestamps of its accepted requests inside the
//! trailing window. A request is accepted while fewer than `max_requests`
//! timestamps remain after eviction; rejected requests leave no trace.
//!
//! The ledger lives in one process only, so several instances behind a load
//! balancer each enforce their own limit.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::RateLimitConfig;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        /// Requests still available in the current window
        remaining: u32,
    },
    Limited {
        /// Time until the oldest recorded request leaves the window
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    ledger: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request for `identifier` if it is under the limit.
    pub async fn allow(&self, identifier: &str) -> bool {
        self.check(identifier).await.is_allowed()
    }

    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = Instant::now();
        let window = self.config.window();
        let max = self.config.max_requests as usize;

        let mut ledger = self.ledger.lock().await;
        let stamps = ledger.entry(identifier.to_string()).or_default();
        evict_expired(stamps, now, window);

        if stamps.len() < max {
            stamps.push_back(now);
            let remaining = (max - stamps.len()) as u32;
            debug!(identifier, remaining, "Request allowed");
            return RateLimitDecision::Allowed { remaining };
        }

        let retry_after = stamps
            .front()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(window);
        debug!(identifier, ?retry_after, "Rate limit exceeded");
        RateLimitDecision::Limited { retry_after }
    }

    /// Drops expired timestamps and forgets identifiers left with none.
    /// Returns how many identifiers were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window();

        let mut ledger = self.ledger.lock().await;
        let before = ledger.len();
        ledger.retain(|_, stamps| {
            evict_expired(stamps, now, window);
            !stamps.is_empty()
        });
        before - ledger.len()
    }

    /// Number of identifiers currently held in the ledger.
    pub async fn tracked_identifiers(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Starts the periodic sweep. The task runs until the returned handle is
    /// shut down or dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let every = self.config.sweep_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = limiter.sweep().await;
                        debug!(purged, "Rate limiter sweep finished");
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            info!("Rate limiter sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of the background sweep task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

fn evict_expired(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = stamps.front() {
        if now.duration_since(*oldest) < window {
            break;
        }
        stamps.pop_front();
    }
}
