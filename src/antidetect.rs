//! Anti-detection profiles (C1).
//!
//! The five required profiles are read-only process-global data (a small
//! static registry, safe to share because it never changes). What *does*
//! change — the caller's currently-selected profile, rate limit, and
//! response-size cap — is owned by a single [`AntiDetectState`] behind a
//! lock, per the Design Notes: "respecify as a configuration object owned by
//! the dispatcher and passed explicitly into fetcher calls," not a hidden
//! module-level global.

use crate::error::{AppError, ErrorCode};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::seq::IndexedRandom;
use std::collections::HashMap;

pub const RATE_LIMIT_DELAY_BOUNDS: (f64, f64) = (0.1, 60.0);
pub const MAX_RESPONSE_CHARS_BOUNDS: (usize, usize) = (1_000, 1_000_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Standard,
    BrowserEmulation,
}

/// An immutable named bundle of headers/user-agent/TLS hint/default rate.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: &'static str,
    pub headers: HashMap<String, String>,
    pub user_agents: Vec<String>,
    pub tls_mode: TlsMode,
    pub default_rate_delay_s: f64,
}

impl Profile {
    /// Pick a user-agent for this request. `stealth` rotates among its fixed
    /// list on each call; other profiles have exactly one.
    pub fn pick_user_agent(&self) -> &str {
        if self.user_agents.len() <= 1 {
            return self.user_agents.first().map(String::as_str).unwrap_or("");
        }
        let mut rng = rand::rng();
        self.user_agents
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(&self.user_agents[0])
    }
}

fn headers_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

static REGISTRY: Lazy<HashMap<&'static str, Profile>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        "balanced",
        Profile {
            name: "balanced",
            headers: headers_of(&[("Accept", "text/html,application/xhtml+xml,*/*;q=0.8"), ("Accept-Language", "en-US,en;q=0.9")]),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            ],
            tls_mode: TlsMode::Standard,
            default_rate_delay_s: 1.0,
        },
    );

    m.insert(
        "stealth",
        Profile {
            name: "stealth",
            headers: headers_of(&[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("Sec-Fetch-Mode", "navigate"),
            ]),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1".to_string(),
            ],
            tls_mode: TlsMode::BrowserEmulation,
            default_rate_delay_s: 2.0,
        },
    );

    m.insert(
        "browser_tls",
        Profile {
            name: "browser_tls",
            headers: headers_of(&[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
                ("Upgrade-Insecure-Requests", "1"),
            ]),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
            ],
            tls_mode: TlsMode::BrowserEmulation,
            default_rate_delay_s: 1.5,
        },
    );

    m.insert(
        "none",
        Profile {
            name: "none",
            headers: HashMap::new(),
            user_agents: vec!["webscout-tools/0.1".to_string()],
            tls_mode: TlsMode::Standard,
            default_rate_delay_s: 0.0,
        },
    );

    m.insert(
        "custom",
        Profile {
            name: "custom",
            headers: HashMap::new(),
            user_agents: vec!["webscout-tools/0.1".to_string()],
            tls_mode: TlsMode::Standard,
            default_rate_delay_s: 1.0,
        },
    );

    m
});

/// Look up a profile by name. `custom` is returned as its bare registry
/// entry; callers wanting caller-supplied headers/UA should overlay them via
/// [`EffectiveProfile`].
pub fn lookup(name: &str) -> Option<&'static Profile> {
    REGISTRY.get(name)
}

pub fn is_valid_profile_name(name: &str) -> bool {
    REGISTRY.contains_key(name)
}

/// A profile with any `custom` overrides already applied — what the fetcher
/// actually sends.
#[derive(Debug, Clone)]
pub struct EffectiveProfile {
    pub headers: HashMap<String, String>,
    pub user_agent: String,
    pub tls_mode: TlsMode,
}

/// The mutable, dispatcher-owned anti-detection state. One instance per
/// process, constructed explicitly (never a hidden global) and passed by
/// `Arc` into the fetcher.
#[derive(Debug)]
pub struct AntiDetectState {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone)]
struct Inner {
    current_profile: String,
    custom_headers: HashMap<String, String>,
    custom_user_agent: Option<String>,
    rate_limit_delay_s: f64,
    max_response_chars: usize,
    respect_robots_txt: bool,
}

impl Default for AntiDetectState {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                current_profile: "balanced".to_string(),
                custom_headers: HashMap::new(),
                custom_user_agent: None,
                rate_limit_delay_s: 1.0,
                max_response_chars: 100_000,
                respect_robots_txt: true,
            }),
        }
    }
}

/// Result of a successful `set_antidetection` call.
#[derive(Debug, Clone)]
pub struct AntiDetectSettings {
    pub profile: String,
    pub rate_limit_delay: f64,
    pub max_response_chars: usize,
    pub respect_robots_txt: bool,
}

impl AntiDetectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current effective rate limit delay, fed to the rate limiter (C3).
    pub fn rate_limit_delay_s(&self) -> f64 {
        self.inner.read().rate_limit_delay_s
    }

    pub fn max_response_chars(&self) -> usize {
        self.inner.read().max_response_chars
    }

    /// Whether the fetcher should consult robots.txt before fetching.
    /// Flipped via `set_antidetection(respect_robots_txt=false)`.
    pub fn respect_robots_txt(&self) -> bool {
        self.inner.read().respect_robots_txt
    }

    /// Resolve the currently-selected profile into what the fetcher should
    /// actually send for this request.
    pub fn effective_profile(&self) -> EffectiveProfile {
        let inner = self.inner.read();
        let base = lookup(&inner.current_profile).expect("current_profile is always valid");

        if inner.current_profile == "custom" {
            return EffectiveProfile {
                headers: inner.custom_headers.clone(),
                user_agent: inner
                    .custom_user_agent
                    .clone()
                    .unwrap_or_else(|| base.user_agents[0].clone()),
                tls_mode: base.tls_mode,
            };
        }

        EffectiveProfile {
            headers: base.headers.clone(),
            user_agent: base.pick_user_agent().to_string(),
            tls_mode: base.tls_mode,
        }
    }

    /// Validates and swaps the process-wide current profile plus rate limit /
    /// response cap under a single write lock.
    pub fn set(
        &self,
        profile: &str,
        custom_headers: Option<HashMap<String, String>>,
        custom_user_agent: Option<String>,
        rate_limit_delay: Option<f64>,
        max_response_chars: Option<usize>,
        respect_robots_txt: Option<bool>,
    ) -> Result<AntiDetectSettings, AppError> {
        if !is_valid_profile_name(profile) {
            return Err(AppError::new(
                ErrorCode::InvalidProfile,
                format!("unknown antidetection profile '{profile}'"),
            )
            .with_detail("profile", profile.to_string()));
        }

        if let Some(delay) = rate_limit_delay {
            let (lo, hi) = RATE_LIMIT_DELAY_BOUNDS;
            if !(lo..=hi).contains(&delay) {
                return Err(AppError::new(
                    ErrorCode::InvalidRateLimit,
                    format!("rate_limit_delay {delay} out of bounds [{lo}, {hi}]"),
                )
                .with_detail("rate_limit_delay", delay));
            }
        }

        if let Some(chars) = max_response_chars {
            let (lo, hi) = MAX_RESPONSE_CHARS_BOUNDS;
            if !(lo..=hi).contains(&chars) {
                return Err(AppError::new(
                    ErrorCode::InvalidMaxResponseChars,
                    format!("max_response_chars {chars} out of bounds [{lo}, {hi}]"),
                )
                .with_detail("max_response_chars", chars as u64));
            }
        }

        let mut inner = self.inner.write();
        inner.current_profile = profile.to_string();
        if let Some(headers) = custom_headers {
            inner.custom_headers = headers;
        }
        if let Some(ua) = custom_user_agent {
            inner.custom_user_agent = Some(ua);
        }
        if let Some(delay) = rate_limit_delay {
            inner.rate_limit_delay_s = delay;
        }
        if let Some(chars) = max_response_chars {
            inner.max_response_chars = chars;
        }
        if let Some(respect) = respect_robots_txt {
            inner.respect_robots_txt = respect;
        }

        Ok(AntiDetectSettings {
            profile: inner.current_profile.clone(),
            rate_limit_delay: inner.rate_limit_delay_s,
            max_response_chars: inner.max_response_chars,
            respect_robots_txt: inner.respect_robots_txt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_profiles_exist() {
        for name in ["balanced", "stealth", "browser_tls", "none", "custom"] {
            assert!(lookup(name).is_some(), "missing required profile {name}");
        }
    }

    #[test]
    fn stealth_has_multiple_user_agents() {
        let p = lookup("stealth").unwrap();
        assert!(p.user_agents.len() > 1);
    }

    #[test]
    fn set_rejects_unknown_profile() {
        let state = AntiDetectState::new();
        let err = state.set("ghost", None, None, None, None, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidProfile);
    }

    #[test]
    fn set_rejects_out_of_range_rate_limit() {
        let state = AntiDetectState::new();
        let err = state.set("balanced", None, None, Some(100.0), None, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRateLimit);
    }

    #[test]
    fn set_rejects_out_of_range_max_response_chars() {
        let state = AntiDetectState::new();
        let err = state.set("balanced", None, None, None, Some(10), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMaxResponseChars);
    }

    #[test]
    fn custom_profile_uses_caller_supplied_headers() {
        let state = AntiDetectState::new();
        let mut headers = HashMap::new();
        headers.insert("X-Custom".to_string(), "yes".to_string());
        state
            .set("custom", Some(headers.clone()), Some("MyAgent/1.0".to_string()), None, None, None)
            .unwrap();
        let eff = state.effective_profile();
        assert_eq!(eff.user_agent, "MyAgent/1.0");
        assert_eq!(eff.headers.get("X-Custom"), Some(&"yes".to_string()));
    }

    #[test]
    fn successful_set_updates_rate_and_cap() {
        let state = AntiDetectState::new();
        let settings = state.set("stealth", None, None, Some(5.0), Some(2000), None).unwrap();
        assert_eq!(settings.profile, "stealth");
        assert_eq!(settings.rate_limit_delay, 5.0);
        assert_eq!(settings.max_response_chars, 2000);
        assert_eq!(state.rate_limit_delay_s(), 5.0);
    }
}
