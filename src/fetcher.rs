//! HTTP fetcher (C4): validates the request, consults robots (C2) and the
//! rate limiter (C3), executes with the current anti-detection profile (C1),
//! retries transient failures with exponential backoff + jitter honoring
//! `Retry-After`, and classifies the terminal outcome into a stable error
//! code.
//!
//! The actual network call goes through the [`Fetcher`] trait — the seam
//! where TLS fingerprinting would plug in. The shipped [`ReqwestFetcher`] is
//! a thin `reqwest::Client` wrapper; tests stub the trait directly or point
//! a real `reqwest::Client` at a `wiremock` server.

use crate::antidetect::AntiDetectState;
use crate::error::{AppError, ErrorCode};
use crate::rate_limiter::RateLimiter;
use crate::robots::{RobotsCache, RobotsFetcher};
use crate::types::{FetchRequest, FetchResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const TIMEOUT_BOUNDS: (u64, u64) = (1, 300);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// A single raw HTTP response, abstracted away from any particular client
/// library so [`Fetcher`] implementations (and their test doubles) stay thin.
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// The URL the response actually came from, after any redirects the
    /// client followed. Equal to the requested URL when there were none.
    pub final_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request error: {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn execute(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Default production [`Fetcher`] backed by `reqwest`.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("reqwest client with default config always builds"),
        }
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn execute(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let mut builder = self.client.get(url).timeout(timeout).header("User-Agent", user_agent);
        for (k, v) in headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        let resp = builder.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let mut out_headers = HashMap::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out_headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }
        let body = resp.bytes().await.map_err(classify_reqwest_error)?.to_vec();
        Ok(RawResponse {
            status,
            headers: out_headers,
            body,
            final_url,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Validate the URL has scheme http/https and a present host, matching the
/// `FetchRequest` invariant.
pub fn validate_url(url: &str) -> Result<url::Url, AppError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| AppError::new(ErrorCode::InvalidUrl, format!("could not parse url: {e}")).with_detail("url", url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(AppError::new(ErrorCode::InvalidUrl, "url scheme must be http or https").with_detail("url", url.to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(AppError::new(ErrorCode::InvalidUrl, "url has no host").with_detail("url", url.to_string()));
    }
    Ok(parsed)
}

/// Literal-IP SSRF guard: blocks loopback, RFC 1918/link-local, and
/// unspecified addresses, plus the `localhost` name. A best-effort check —
/// it does not resolve DNS names, so a domain that rebinds to a private
/// address at request time is not caught here.
fn is_blocked_host(url: &url::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified() || v4.is_broadcast() || v4.is_documentation(),
        Some(url::Host::Ipv6(v6)) => v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        None => false,
    }
}

pub struct HttpFetcher<F: Fetcher, R: RobotsFetcher> {
    fetcher: F,
    robots: Arc<RobotsCache<R>>,
    rate_limiter: Arc<RateLimiter>,
    antidetect: Arc<AntiDetectState>,
    block_private_hosts: bool,
}

impl<F: Fetcher, R: RobotsFetcher> HttpFetcher<F, R> {
    /// Production wiring: requests to loopback/private/link-local hosts are
    /// rejected with `SSRF_BLOCKED` before any network call is made.
    pub fn new(fetcher: F, robots: Arc<RobotsCache<R>>, rate_limiter: Arc<RateLimiter>, antidetect: Arc<AntiDetectState>) -> Self {
        Self {
            fetcher,
            robots,
            rate_limiter,
            antidetect,
            block_private_hosts: true,
        }
    }

    /// Test/dev wiring that allows loopback/private hosts through, for
    /// pointing at a local mock server. Never use this for a caller-facing
    /// deployment.
    pub fn new_allowing_private_hosts(fetcher: F, robots: Arc<RobotsCache<R>>, rate_limiter: Arc<RateLimiter>, antidetect: Arc<AntiDetectState>) -> Self {
        Self {
            fetcher,
            robots,
            rate_limiter,
            antidetect,
            block_private_hosts: false,
        }
    }

    /// Run the full fetch pipeline: validate, check robots, rate-limit, and
    /// execute with retry, producing a [`FetchResult`].
    pub async fn fetch(&self, req: &FetchRequest) -> Result<FetchResult, AppError> {
        let parsed = validate_url(&req.url)?;
        let host = parsed.host_str().expect("validated above").to_string();

        if self.block_private_hosts && is_blocked_host(&parsed) {
            return Err(AppError::new(ErrorCode::SsrfBlocked, format!("{host} resolves to a private, loopback, or link-local address")).with_detail("url", req.url.clone()));
        }

        let timeout_secs = req.timeout_seconds.clamp(TIMEOUT_BOUNDS.0, TIMEOUT_BOUNDS.1);
        let timeout = Duration::from_secs(timeout_secs);

        let effective_profile = self.antidetect.effective_profile();
        let configured_delay = self.antidetect.rate_limit_delay_s();

        if req.respect_robots {
            let allowed = self.robots.allowed(&req.url, &effective_profile.user_agent, true).await;
            if !allowed {
                return Err(AppError::new(ErrorCode::RobotsBlocked, format!("{host} disallows this path via robots.txt")).with_detail("url", req.url.clone()));
            }
        }

        let robots_delay = self.robots.crawl_delay(&req.url, req.respect_robots).await;
        let effective_delay = RateLimiter::effective_delay(configured_delay, robots_delay);
        self.rate_limiter.wait(&host, effective_delay).await;

        let start = Instant::now();
        let mut attempt: u32 = 0;
        let mut saw_429 = false;
        loop {
            let outcome = self.fetcher.execute(&req.url, &effective_profile.headers, &effective_profile.user_agent, timeout).await;

            match outcome {
                Ok(resp) => {
                    if RETRYABLE_STATUSES.contains(&resp.status) && attempt < MAX_RETRIES {
                        saw_429 = saw_429 || resp.status == 429;
                        let delay = retry_delay(attempt, resp.headers.get("retry-after").map(String::as_str));
                        crate::logging::log_retry(&host, attempt, delay.as_millis() as u64, "retryable_status");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(self.build_result(req, resp, start.elapsed(), saw_429));
                }
                Err(err) => {
                    let retryable = matches!(err, TransportError::Timeout | TransportError::Connection(_));
                    if retryable && attempt < MAX_RETRIES {
                        let delay = retry_delay(attempt, None);
                        let cause = match &err {
                            TransportError::Timeout => "timeout",
                            TransportError::Connection(_) => "connection_error",
                            TransportError::Other(_) => "other",
                        };
                        crate::logging::log_retry(&host, attempt, delay.as_millis() as u64, cause);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classify_terminal_error(&req.url, err));
                }
            }
        }
    }

    fn build_result(&self, req: &FetchRequest, resp: RawResponse, elapsed: std::time::Duration, rate_limited: bool) -> FetchResult {
        let content_type = resp.headers.get("content-type").cloned();
        let charset = content_type.as_deref().and_then(extract_charset);
        let body = truncate_chars(&decode_body(&resp.body, charset.as_deref()), self.antidetect.max_response_chars());
        let final_url = resp.final_url.clone();

        FetchResult {
            url: req.url.clone(),
            final_url,
            http_status: Some(resp.status),
            content_bytes: resp.body.len(),
            content_type,
            charset,
            body,
            headers: resp.headers,
            elapsed_ms: elapsed.as_millis() as u64,
            error: terminal_error_code(resp.status).map(|c| c.as_str().to_string()),
            rate_limited,
        }
    }
}

/// `base * 2^attempt` capped at 30s, plus uniform jitter, honoring
/// `Retry-After` (seconds or HTTP-date) when present, also capped at 30s.
fn retry_delay(attempt: u32, retry_after: Option<&str>) -> Duration {
    if let Some(header) = retry_after {
        if let Some(d) = parse_retry_after(header) {
            return d.min(BACKOFF_CAP);
        }
    }
    let exp = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exp.min(BACKOFF_CAP);
    let jitter_ms = rand::rng().random_range(0..=250u64);
    capped + Duration::from_millis(jitter_ms)
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(when) = DateTime::parse_from_rfc2822(value.trim()) {
        let now = Utc::now();
        let target = when.with_timezone(&Utc);
        let diff = (target - now).num_milliseconds();
        if diff > 0 {
            return Some(Duration::from_millis(diff as u64));
        }
        return Some(Duration::from_secs(0));
    }
    None
}

fn terminal_error_code(status: u16) -> Option<ErrorCode> {
    match status {
        200..=299 => None,
        404 => Some(ErrorCode::UrlNotFound),
        403 => Some(ErrorCode::AccessDenied),
        429 => Some(ErrorCode::RateLimited),
        500..=599 => Some(ErrorCode::FetchError),
        _ => None,
    }
}

fn classify_terminal_error(url: &str, err: TransportError) -> AppError {
    let (code, message) = match err {
        TransportError::Timeout => (ErrorCode::TimeoutError, "request timed out".to_string()),
        TransportError::Connection(msg) => (ErrorCode::ConnectionError, msg),
        TransportError::Other(msg) => (ErrorCode::FetchError, msg),
    };
    AppError::new(code, message).with_detail("url", url.to_string())
}

/// Truncate to at most `max_chars` Unicode scalar values, respecting UTF-8
/// character boundaries so a multi-byte char is never split.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
    }
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("charset="))
        .map(|c| c.trim_matches('"').to_lowercase())
}

/// Decode a body using the declared charset, or BOM detection, falling back
/// to UTF-8 with replacement. Only UTF-8 and common ASCII-superset charsets
/// (latin1/windows-1252 approximated via lossy UTF-8) are attempted directly;
/// anything this can't decode precisely still produces readable text rather
/// than an error.
fn decode_body(bytes: &[u8], charset: Option<&str>) -> String {
    if let Some(cs) = charset {
        if cs.eq_ignore_ascii_case("utf-8") || cs.eq_ignore_ascii_case("utf8") {
            return String::from_utf8_lossy(bytes).into_owned();
        }
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}
