//! Per-host rate limiter (C3): a token-less minimum-delay gate.
//!
//! `wait(host)` blocks until `now - last_dispatch[host] >= effective_delay`,
//! then records the new dispatch time — all under one per-host
//! `tokio::sync::Mutex` so the check-then-sleep-then-record sequence can't
//! race between two concurrent callers for the same host. Different hosts
//! each get their own mutex behind a `DashMap`, so they never serialize
//! against each other.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

pub struct RateLimiter {
    last_dispatch: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            last_dispatch: DashMap::new(),
        }
    }

    /// `effective_delay = max(configured rate_limit_delay_s, robots Crawl-delay)`.
    pub fn effective_delay(configured_delay_s: f64, robots_crawl_delay_s: Option<f64>) -> Duration {
        let delay = configured_delay_s.max(robots_crawl_delay_s.unwrap_or(0.0)).max(0.0);
        Duration::from_secs_f64(delay)
    }

    /// Block the caller until at least `effective_delay` has elapsed since
    /// this host's last dispatch, then record the new dispatch time.
    /// Concurrent callers for the same host serialize on the host's mutex in
    /// FIFO lock-acquisition order; different hosts proceed independently.
    pub async fn wait(&self, host: &str, effective_delay: Duration) {
        let slot = self
            .last_dispatch
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < effective_delay {
                sleep(effective_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        self.last_dispatch.len()
    }
}
