//! External REST surface (C14): read-only endpoints mirroring the session
//! store 1:1, plus public `/ping` and `/health`. Built on `axum`.

use crate::dispatcher::AppState;
use crate::error::AppError;
use crate::types::Session;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/dispatch/:tool", post(dispatch_tool))
        .route("/sessions/:id/info", get(session_info))
        .route("/sessions/:id/chunks/:index", get(session_chunk))
        .route("/sessions/:id/urls", get(session_urls))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// HTTP entrypoint onto the tool dispatcher (C11), for agents that speak
/// plain JSON-over-HTTP rather than a dedicated MCP transport.
async fn dispatch_tool(State(state): State<Arc<AppState>>, Path(tool): Path<String>, Json(args): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(crate::dispatcher::dispatch(&state, &tool, args).await)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "service": "webscout-tools"}))
}

/// Liveness probe: reports whether the session store answers a read and
/// whether the housekeeper task is still running, not just that the HTTP
/// listener is up.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    // `list` only touches the in-memory metadata index; completing at all
    // (rather than hanging on a poisoned lock) is the reachability signal.
    let session_store_ok = tokio::time::timeout(std::time::Duration::from_secs(2), state.session_store.list(&[])).await.is_ok();
    let housekeeper_ok = state.housekeeper_alive.load(std::sync::atomic::Ordering::Relaxed);
    let status = if session_store_ok && housekeeper_ok { "healthy" } else { "degraded" };
    let code = if session_store_ok && housekeeper_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        code,
        Json(json!({
            "status": status,
            "session_store": if session_store_ok { "reachable" } else { "unreachable" },
            "housekeeper": if housekeeper_ok { "running" } else { "stopped" },
        })),
    )
}

struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "success": false,
            "error_code": self.0.code.as_str(),
            "error": self.0.message,
            "recovery_strategy": self.0.recovery(),
            "details": self.0.details,
        }));
        (status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

fn bearer_group(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn resolve_groups(state: &AppState, headers: &HeaderMap) -> Result<Vec<String>, ApiError> {
    match bearer_group(headers) {
        Some(token) => {
            let info = state.token_verifier.verify(&token).await.map_err(ApiError)?;
            Ok(info.groups)
        }
        None => Ok(Vec::new()),
    }
}

async fn session_info(State(state): State<Arc<AppState>>, Path(id): Path<String>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = resolve_groups(&state, &headers).await?;
    let session: Session = state.session_store.info(&id, &groups).await?;
    Ok(Json(json!({"success": true, "session": session})))
}

async fn session_chunk(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = resolve_groups(&state, &headers).await?;
    let session = state.session_store.info(&id, &groups).await?;
    let bytes = state.session_store.chunk(&id, index, &groups).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    Ok(Json(json!({
        "success": true,
        "session_id": id,
        "chunk_index": index,
        "total_chunks": session.total_chunks,
        "content": content,
    })))
}

async fn session_urls(State(state): State<Arc<AppState>>, Path(id): Path<String>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = resolve_groups(&state, &headers).await?;
    let urls = state.session_store.urls(&id, &groups, None).await?;
    Ok(Json(json!({"success": true, "chunks": urls})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antidetect::AntiDetectState;
    use crate::auth::NoopTokenVerifier;
    use crate::fetcher::{HttpFetcher, ReqwestFetcher};
    use crate::rate_limiter::RateLimiter;
    use crate::robots::{ReqwestRobotsFetcher, RobotsCache};
    use crate::session::{FsBlobStore, FsMetadataIndex, SessionStore};
    use std::sync::atomic::AtomicBool;

    async fn make_state(dir: &std::path::Path) -> AppState {
        let antidetect = Arc::new(AntiDetectState::new());
        let robots = Arc::new(RobotsCache::new(ReqwestRobotsFetcher::new(reqwest::Client::new())));
        let rate_limiter = Arc::new(RateLimiter::new());
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
    async fn health_reports_healthy_when_session_store_and_housekeeper_are_up() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(make_state(dir.path()).await);
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["session_store"], "reachable");
        assert_eq!(body["housekeeper"], "running");
    }

    #[tokio::test]
    async fn health_reports_degraded_once_housekeeper_has_exited() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(make_state(dir.path()).await);
        state.housekeeper_alive.store(false, std::sync::atomic::Ordering::Relaxed);
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["housekeeper"], "stopped");
    }
}
