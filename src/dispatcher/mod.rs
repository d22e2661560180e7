//! Tool dispatcher (C11): a fixed, statically-built registry of named tools.
//! Dispatch is a single lookup plus schema validation plus auth resolution —
//! never a decorator-driven registration pass.

pub mod schema;
pub mod tools;

use crate::antidetect::AntiDetectState;
use crate::auth::TokenVerifier;
use crate::error::{AppError, ErrorCode};
use crate::fetcher::{HttpFetcher, ReqwestFetcher};
use crate::robots::ReqwestRobotsFetcher;
use crate::session::SessionStore;
use crate::session::{FsBlobStore, FsMetadataIndex};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct AppState {
    pub antidetect: Arc<AntiDetectState>,
    pub fetcher: Arc<HttpFetcher<ReqwestFetcher, ReqwestRobotsFetcher>>,
    pub session_store: Arc<SessionStore<FsBlobStore, FsMetadataIndex>>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    /// Flipped to `false` by `main` once the housekeeper task exits, so
    /// `/health` can report it as unreachable instead of reading stale state.
    pub housekeeper_alive: Arc<AtomicBool>,
}

type ToolHandler = for<'a> fn(&'a AppState, &'a Value, &'a [String]) -> BoxFuture<'a, Result<Value, AppError>>;

pub struct ToolSpec {
    pub name: &'static str,
    pub handler: ToolHandler,
}

macro_rules! spec {
    ($name:literal, $func:path) => {
        ToolSpec {
            name: $name,
            handler: |state, args, group| Box::pin($func(state, args, group)),
        }
    };
}

static REGISTRY: Lazy<HashMap<&'static str, ToolSpec>> = Lazy::new(|| {
    let specs = vec![
        spec!("ping", tools::ping),
        spec!("set_antidetection", tools::set_antidetection),
        spec!("get_content", tools::get_content),
        spec!("get_structure", tools::get_structure),
        spec!("get_session_info", tools::get_session_info),
        spec!("get_session_chunk", tools::get_session_chunk),
        spec!("list_sessions", tools::list_sessions),
        spec!("get_session_urls", tools::get_session_urls),
        spec!("get_session", tools::get_session),
    ];
    specs.into_iter().map(|s| (s.name, s)).collect()
});

pub fn tool_names() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}

/// Dispatch one tool invocation, producing the uniform envelope: `{success:
/// true, ...}` or `{success: false, error_code, error, recovery_strategy,
/// details}`.
pub async fn dispatch(state: &AppState, tool_name: &str, args: Value) -> Value {
    match dispatch_inner(state, tool_name, &args).await {
        Ok(value) => value,
        Err(err) => json!({
            "success": false,
            "error_code": err.code.as_str(),
            "error": err.message,
            "recovery_strategy": err.recovery(),
            "details": err.details,
        }),
    }
}

async fn dispatch_inner(state: &AppState, tool_name: &str, args: &Value) -> Result<Value, AppError> {
    let spec = REGISTRY
        .get(tool_name)
        .ok_or_else(|| AppError::new(ErrorCode::UnknownTool, format!("no such tool '{tool_name}'")).with_detail("tool_name", tool_name.to_string()))?;

    let groups = match args.get("auth_token").and_then(Value::as_str) {
        Some(token) => {
            let info = state.token_verifier.verify(token).await?;
            info.groups
        }
        None => Vec::new(),
    };

    (spec.handler)(state, args, &groups).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoopTokenVerifier;
    use crate::robots::ReqwestRobotsFetcher;
    use crate::session::{FsBlobStore, FsMetadataIndex};

    async fn make_state(dir: &std::path::Path) -> AppState {
        let antidetect = Arc::new(AntiDetectState::new());
        let robots = Arc::new(crate::robots::RobotsCache::new(ReqwestRobotsFetcher::new(reqwest::Client::new())));
        let rate_limiter = Arc::new(crate::rate_limiter::RateLimiter::new());
        let fetcher = Arc::new(HttpFetcher::new(ReqwestFetcher::new(), robots, rate_limiter, antidetect.clone()));
        let blobs = FsBlobStore::new(dir.join("blobs"));
        let metadata = FsMetadataIndex::load(dir.join("metadata.json")).await.unwrap();
        let session_store = Arc::new(SessionStore::new(blobs, metadata));
        AppState {
            antidetect,
            fetcher,
            session_store,
            token_verifier: Arc::new(NoopTokenVerifier),
            housekeeper_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    #[tokio::test]
    async fn unknown_tool_returns_unknown_tool_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        let result = dispatch(&state, "does_not_exist", json!({})).await;
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error_code"], json!("UNKNOWN_TOOL"));
    }

    #[tokio::test]
    async fn ping_returns_ok_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        let result = dispatch(&state, "ping", json!({})).await;
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["status"], json!("ok"));
    }

    #[tokio::test]
    async fn set_antidetection_rejects_bad_profile() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        let result = dispatch(&state, "set_antidetection", json!({"profile": "nonsense"})).await;
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error_code"], json!("INVALID_PROFILE"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;
        let result = dispatch(&state, "get_session_info", json!({})).await;
        assert_eq!(result["error_code"], json!("INVALID_ARGUMENT"));
    }
}
