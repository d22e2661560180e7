//! Individual tool handlers (C11). Each takes the shared [`AppState`], the
//! raw argument object, and the caller's full group set (already resolved
//! from the auth token), and returns either a JSON payload or a typed error.

use super::schema::{opt_bool, opt_bool_opt, opt_f64, opt_str, opt_usize, require_str};
use super::AppState;
use crate::crawler::{self, CrawlRequest};
use crate::error::{AppError, ErrorCode};
use crate::extractor;
use crate::news;
use crate::structure;
use crate::types::{FetchRequest, Session, SessionContentType};
use chrono::Utc;
use serde_json::{json, Value};

pub async fn ping(_state: &AppState, _args: &Value, _groups: &[String]) -> Result<Value, AppError> {
    Ok(json!({"status": "ok", "service": "webscout-tools"}))
}

pub async fn set_antidetection(state: &AppState, args: &Value, _groups: &[String]) -> Result<Value, AppError> {
    let profile = require_str(args, "profile")?;
    let custom_headers = args.get("custom_headers").and_then(Value::as_object).map(|m| {
        m.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    });
    let custom_user_agent = opt_str(args, "custom_user_agent").map(str::to_string);
    let rate_limit_delay = opt_f64(args, "rate_limit_delay")?;
    let respect_robots_txt = opt_bool_opt(args, "respect_robots_txt")?;
    let max_response_chars = match args.get("max_response_chars") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| AppError::new(ErrorCode::InvalidArgument, "max_response_chars must be an integer"))? as usize),
    };

    let settings = state
        .antidetect
        .set(profile, custom_headers, custom_user_agent, rate_limit_delay, max_response_chars, respect_robots_txt)?;

    Ok(json!({
        "success": true,
        "profile": settings.profile,
        "rate_limit_delay": settings.rate_limit_delay,
        "max_response_chars": settings.max_response_chars,
        "respect_robots_txt": settings.respect_robots_txt,
    }))
}

pub async fn get_content(state: &AppState, args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let url = require_str(args, "url")?;
    let selector = opt_str(args, "selector");
    let depth = opt_usize(args, "depth", 1)?.clamp(1, 255) as u8;
    let max_pages_per_level = opt_usize(args, "max_pages_per_level", 10)?;
    let session_requested = opt_bool(args, "session", false)?;
    let parse_results = opt_bool(args, "parse_results", true)?;
    let source_profile_name = opt_str(args, "source_profile_name");
    let timeout_seconds = opt_usize(args, "timeout_seconds", 60)? as u64;

    if depth <= 1 && !session_requested {
        let fetch_req = FetchRequest {
            url: url.to_string(),
            profile: "balanced".to_string(),
            selector: selector.map(str::to_string),
            timeout_seconds,
            respect_robots: state.antidetect.respect_robots_txt(),
        };
        let result = state.fetcher.fetch(&fetch_req).await?;
        if let Some(code) = &result.error {
            return Err(AppError::new(ErrorCode::FetchError, format!("fetch failed with {code}")));
        }
        let content = extractor::extract(&result.body, &result.final_url, selector)?;
        return Ok(json!({"success": true, "content": content}));
    }

    let crawl_req = CrawlRequest {
        start_url: url.to_string(),
        depth,
        max_pages_per_level,
        profile: "balanced".to_string(),
        timeout_seconds,
        respect_robots: state.antidetect.respect_robots_txt(),
    };
    let crawl_result = crawler::crawl(state.fetcher.as_ref(), &crawl_req).await?;

    let (bytes, content_type) = if parse_results {
        let feed = news::parse(&crawl_result, Utc::now(), source_profile_name).map_err(|e| AppError::new(ErrorCode::ParseError, e.to_string()))?;
        (serde_json::to_vec(&feed).map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?, SessionContentType::ParsedFeed)
    } else {
        (serde_json::to_vec(&crawl_result).map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?, SessionContentType::RawCrawl)
    };

    let session_id = state.session_store.create(&bytes, url, groups.first().cloned(), crate::session::DEFAULT_CHUNK_SIZE, content_type).await?;
    let info = state.session_store.info(&session_id, groups).await?;

    Ok(json!({
        "success": true,
        "response_type": "session",
        "session_id": session_id,
        "total_chunks": info.total_chunks,
        "total_size_bytes": info.total_size_bytes,
    }))
}

pub async fn get_structure(state: &AppState, args: &Value, _groups: &[String]) -> Result<Value, AppError> {
    let url = require_str(args, "url")?;
    let selector = opt_str(args, "selector");
    let timeout_seconds = opt_usize(args, "timeout_seconds", 60)? as u64;

    let fetch_req = FetchRequest {
        url: url.to_string(),
        profile: "balanced".to_string(),
        selector: None,
        timeout_seconds,
        respect_robots: state.antidetect.respect_robots_txt(),
    };
    let result = state.fetcher.fetch(&fetch_req).await?;
    if let Some(code) = &result.error {
        return Err(AppError::new(ErrorCode::FetchError, format!("fetch failed with {code}")));
    }
    let structure = structure::analyze(&result.body, &result.final_url, selector)?;
    Ok(json!({"success": true, "structure": structure}))
}

pub async fn get_session_info(state: &AppState, args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let session_id = require_str(args, "session_id")?;
    let session: Session = state.session_store.info(session_id, groups).await?;
    Ok(json!({"success": true, "session": session}))
}

pub async fn get_session_chunk(state: &AppState, args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let session_id = require_str(args, "session_id")?;
    let chunk_index = opt_usize(args, "chunk_index", 0)?;
    let session = state.session_store.info(session_id, groups).await?;
    let bytes = state.session_store.chunk(session_id, chunk_index, groups).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    Ok(json!({
        "success": true,
        "session_id": session_id,
        "chunk_index": chunk_index,
        "total_chunks": session.total_chunks,
        "content": content,
    }))
}

pub async fn list_sessions(state: &AppState, _args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let sessions = state.session_store.list(groups).await;
    Ok(json!({"success": true, "sessions": sessions}))
}

pub async fn get_session_urls(state: &AppState, args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let session_id = require_str(args, "session_id")?;
    let as_json = opt_bool(args, "as_json", true)?;
    let base_url = opt_str(args, "base_url");
    let urls = state.session_store.urls(session_id, groups, base_url).await?;

    if as_json {
        Ok(json!({"success": true, "chunks": urls}))
    } else {
        Ok(json!({"success": true, "chunk_urls": urls}))
    }
}

pub async fn get_session(state: &AppState, args: &Value, groups: &[String]) -> Result<Value, AppError> {
    let session_id = require_str(args, "session_id")?;
    let max_bytes = opt_usize(args, "max_bytes", crate::session::DEFAULT_GET_FULL_MAX_BYTES)?;
    let bytes = state.session_store.get_full(session_id, groups, max_bytes).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    Ok(json!({"success": true, "content": content}))
}
