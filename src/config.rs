//! Process configuration, loaded once from the environment at start.
//!
//! No subsystem reads `std::env` directly; `AppConfig` is parsed once in
//! `main` and threaded explicitly into every constructor so process-wide
//! state stays explicit rather than hidden behind a global.

use std::path::PathBuf;

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_root: PathBuf,
    pub housekeeper_interval_minutes: u64,
    pub max_storage_mb: u64,
    pub housekeeper_stale_after_s: u64,
    pub log_sink_url: Option<String>,
    pub log_sink_api_key: Option<String>,
    pub public_web_base_url: Option<String>,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            housekeeper_interval_minutes: 60,
            max_storage_mb: 500,
            housekeeper_stale_after_s: 3600,
            log_sink_url: None,
            log_sink_api_key: None,
            public_web_base_url: None,
            bind_addr: "127.0.0.1:8089".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from environment, falling back to documented defaults for any
    /// variable that is unset or fails to parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_root: std::env::var("SCRAPE_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            housekeeper_interval_minutes: env_parsed("SCRAPE_HOUSEKEEPER_INTERVAL_MINUTES")
                .map(|v: u64| v.max(1))
                .unwrap_or(defaults.housekeeper_interval_minutes),
            max_storage_mb: env_parsed("SCRAPE_MAX_STORAGE_MB").unwrap_or(defaults.max_storage_mb),
            housekeeper_stale_after_s: env_parsed("SCRAPE_HOUSEKEEPER_STALE_AFTER_S")
                .unwrap_or(defaults.housekeeper_stale_after_s),
            log_sink_url: std::env::var("SCRAPE_LOG_SINK_URL").ok(),
            log_sink_api_key: std::env::var("SCRAPE_LOG_SINK_API_KEY").ok(),
            public_web_base_url: std::env::var("SCRAPE_PUBLIC_WEB_BASE_URL").ok(),
            bind_addr: std::env::var("SCRAPE_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_mb.saturating_mul(1024 * 1024)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.storage_root.join("sessions")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.sessions_dir().join("blobs")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.sessions_dir().join("metadata.json")
    }

    pub fn prune_lock_path(&self) -> PathBuf {
        self.sessions_dir().join(".prune_size.lock")
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Request-scoped context threaded explicitly through dispatcher → handler →
/// subsystem calls, so log events can attach `request_id`/`session_id`
/// without an implicit thread-local.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub session_id: Option<String>,
    pub group: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            group: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.housekeeper_interval_minutes, 60);
        assert_eq!(cfg.max_storage_mb, 500);
        assert_eq!(cfg.housekeeper_stale_after_s, 3600);
    }

    #[test]
    fn derived_paths_are_nested_under_storage_root() {
        let cfg = AppConfig {
            storage_root: PathBuf::from("/tmp/x"),
            ..AppConfig::default()
        };
        assert_eq!(cfg.sessions_dir(), PathBuf::from("/tmp/x/sessions"));
        assert_eq!(cfg.blobs_dir(), PathBuf::from("/tmp/x/sessions/blobs"));
        assert_eq!(cfg.metadata_path(), PathBuf::from("/tmp/x/sessions/metadata.json"));
    }
}
