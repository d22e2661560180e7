//! Robots cache (C2): per-host `robots.txt` fetch, parse, TTL cache, and
//! allow/deny query, with the robots-declared `Crawl-delay` surfaced to the
//! rate limiter (C3).
//!
//! Built on the `robotstxt` crate with a per-host TTL cache: fail-open on
//! fetch failure, and at-most-one-concurrent-fetch-per-host (the coalescing
//! is done with a `DashMap<host, Arc<OnceCell<...>>>` rather than re-fetching
//! under a write lock for every caller).

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct RobotsRecord {
    body: String,
    crawl_delay: Option<f64>,
    fetched_at: Instant,
    /// `true` if the fetch itself failed; policy is fail-open, but we still
    /// remember that so we don't hammer a dead host's robots.txt every call.
    fetch_failed: bool,
}

impl RobotsRecord {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// A pluggable fetcher seam so the robots cache doesn't hard-depend on a
/// concrete HTTP client type; the real fetcher (C4) implements this for
/// production, tests can stub it.
#[async_trait::async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, String>;
}

/// Default implementation backed by `reqwest`.
pub struct ReqwestRobotsFetcher {
    client: reqwest::Client,
}

impl ReqwestRobotsFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RobotsFetcher for ReqwestRobotsFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("robots.txt fetch returned {}", resp.status()));
        }
        resp.text().await.map_err(|e| e.to_string())
    }
}

pub struct RobotsCache<F: RobotsFetcher> {
    fetcher: F,
    ttl: Duration,
    cache: DashMap<String, Arc<OnceCell<RobotsRecord>>>,
}

impl<F: RobotsFetcher> RobotsCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            ttl: DEFAULT_TTL,
            cache: DashMap::new(),
        }
    }

    pub fn with_ttl(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: DashMap::new(),
        }
    }

    fn host_key(url: &str) -> Option<(String, String)> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        Some((format!("{}://{}", parsed.scheme(), host), host))
    }

    /// Get (fetching and caching if needed) the robots record for the host
    /// behind `url`. Coalesces concurrent fetches for the same host: the
    /// `OnceCell` slot is created once under the `DashMap` entry API and every
    /// caller awaits the same initialization future.
    async fn record_for(&self, url: &str) -> Option<RobotsRecord> {
        let (origin, host) = Self::host_key(url)?;

        let slot = self.cache.entry(host.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone();
        let slot = if slot.get().is_some_and(|r| r.is_stale(self.ttl)) {
            let fresh = Arc::new(OnceCell::new());
            self.cache.insert(host.clone(), fresh.clone());
            fresh
        } else {
            slot
        };

        let record = slot
            .get_or_init(|| async {
                let robots_url = format!("{origin}/robots.txt");
                match self.fetcher.fetch_text(&robots_url).await {
                    Ok(body) => {
                        let crawl_delay = parse_crawl_delay(&body);
                        RobotsRecord {
                            body,
                            crawl_delay,
                            fetched_at: Instant::now(),
                            fetch_failed: false,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            event = "robots_fetch_failed",
                            operation = "robots_fetch",
                            stage = "fetch",
                            dependency = "target_site",
                            cause_type = "network_error",
                            remediation = "failing open: treating as allow",
                            host = %host,
                            error = %err,
                        );
                        RobotsRecord {
                            body: String::new(),
                            crawl_delay: None,
                            fetched_at: Instant::now(),
                            fetch_failed: true,
                        }
                    }
                }
            })
            .await
            .clone();

        Some(record)
    }

    /// Check whether `user_agent` may fetch `url`. When `respect_robots` is
    /// disabled by the caller, skip the cache entirely and return allow.
    pub async fn allowed(&self, url: &str, user_agent: &str, respect_robots: bool) -> bool {
        if !respect_robots {
            return true;
        }
        let Some(record) = self.record_for(url).await else {
            return true;
        };
        if record.fetch_failed {
            return true;
        }
        DefaultMatcher::default().one_agent_allowed_by_robots(&record.body, user_agent, url)
    }

    /// The robots-declared `Crawl-delay` for the host behind `url`, if any.
    /// Fed into the rate limiter's `effective_delay`.
    pub async fn crawl_delay(&self, url: &str, respect_robots: bool) -> Option<f64> {
        if !respect_robots {
            return None;
        }
        self.record_for(url).await.and_then(|r| r.crawl_delay)
    }
}

fn parse_crawl_delay(robots_body: &str) -> Option<f64> {
    robots_body.lines().find_map(|line| {
        let line = line.trim();
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("crawl-delay") {
            value.trim().parse::<f64>().ok()
        } else {
            None
        }
    })
}
