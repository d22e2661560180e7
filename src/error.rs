//! Stable error taxonomy (C12).
//!
//! Internal components raise typed, component-scoped errors (see `fetcher`,
//! `robots`, `session`, `news::parser`, ...). The dispatcher and REST layer are
//! the *only* places that convert those typed errors into a wire-stable
//! [`ErrorCode`] plus a recovery hint, at the process boundary only.
//! A new error code that has no entry in [`recovery_strategy`] is a bug: the
//! `error_taxonomy_is_complete` test below walks every variant and asserts a
//! recovery string exists for it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, wire-visible error codes. Adding a variant here without adding a
/// matching arm to [`recovery_strategy`] fails the coverage test at the
/// bottom of this file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidUrl,
    InvalidProfile,
    InvalidRateLimit,
    InvalidMaxResponseChars,
    InvalidArgument,
    UrlNotFound,
    AccessDenied,
    RateLimited,
    FetchError,
    TimeoutError,
    ConnectionError,
    RobotsBlocked,
    SelectorNotFound,
    InvalidSelector,
    EncodingError,
    ExtractionError,
    SessionNotFound,
    InvalidChunkIndex,
    ContentTooLarge,
    AuthError,
    PermissionDenied,
    SsrfBlocked,
    ParseError,
    UnknownTool,
    InternalError,
}

impl ErrorCode {
    /// All known codes, used by the coverage test and by documentation tools.
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::InvalidUrl,
        ErrorCode::InvalidProfile,
        ErrorCode::InvalidRateLimit,
        ErrorCode::InvalidMaxResponseChars,
        ErrorCode::InvalidArgument,
        ErrorCode::UrlNotFound,
        ErrorCode::AccessDenied,
        ErrorCode::RateLimited,
        ErrorCode::FetchError,
        ErrorCode::TimeoutError,
        ErrorCode::ConnectionError,
        ErrorCode::RobotsBlocked,
        ErrorCode::SelectorNotFound,
        ErrorCode::InvalidSelector,
        ErrorCode::EncodingError,
        ErrorCode::ExtractionError,
        ErrorCode::SessionNotFound,
        ErrorCode::InvalidChunkIndex,
        ErrorCode::ContentTooLarge,
        ErrorCode::AuthError,
        ErrorCode::PermissionDenied,
        ErrorCode::SsrfBlocked,
        ErrorCode::ParseError,
        ErrorCode::UnknownTool,
        ErrorCode::InternalError,
    ];

    /// The `SCREAMING_SNAKE_CASE` wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::InvalidProfile => "INVALID_PROFILE",
            ErrorCode::InvalidRateLimit => "INVALID_RATE_LIMIT",
            ErrorCode::InvalidMaxResponseChars => "INVALID_MAX_RESPONSE_CHARS",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::UrlNotFound => "URL_NOT_FOUND",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::FetchError => "FETCH_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::RobotsBlocked => "ROBOTS_BLOCKED",
            ErrorCode::SelectorNotFound => "SELECTOR_NOT_FOUND",
            ErrorCode::InvalidSelector => "INVALID_SELECTOR",
            ErrorCode::EncodingError => "ENCODING_ERROR",
            ErrorCode::ExtractionError => "EXTRACTION_ERROR",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::InvalidChunkIndex => "INVALID_CHUNK_INDEX",
            ErrorCode::ContentTooLarge => "CONTENT_TOO_LARGE",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::UnknownTool => "UNKNOWN_TOOL",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this code maps to on the REST surface (C14). Codes that
    /// never cross the REST boundary still get a sensible default.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::AuthError => 401,
            ErrorCode::PermissionDenied | ErrorCode::AccessDenied | ErrorCode::RobotsBlocked | ErrorCode::SsrfBlocked => 403,
            ErrorCode::SessionNotFound | ErrorCode::UrlNotFound | ErrorCode::UnknownTool => 404,
            ErrorCode::InvalidChunkIndex
            | ErrorCode::InvalidUrl
            | ErrorCode::InvalidArgument
            | ErrorCode::InvalidProfile
            | ErrorCode::InvalidRateLimit
            | ErrorCode::InvalidMaxResponseChars
            | ErrorCode::InvalidSelector
            | ErrorCode::SelectorNotFound => 400,
            ErrorCode::RateLimited => 429,
            ErrorCode::ContentTooLarge => 413,
            ErrorCode::TimeoutError => 504,
            ErrorCode::ConnectionError | ErrorCode::FetchError | ErrorCode::EncodingError
            | ErrorCode::ExtractionError | ErrorCode::ParseError | ErrorCode::InternalError => 502,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actionable, user-visible recovery hint for an [`ErrorCode`]. Every code in
/// [`ErrorCode::ALL`] must have an entry here — see `error_taxonomy_is_complete`.
pub fn recovery_strategy(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidUrl => "Provide a url with scheme http or https and a resolvable host.",
        ErrorCode::InvalidProfile => "Call set_antidetection with one of: balanced, stealth, browser_tls, none, custom.",
        ErrorCode::InvalidRateLimit => "Provide rate_limit_delay between 0.1 and 60 seconds.",
        ErrorCode::InvalidMaxResponseChars => "Provide max_response_chars between 1000 and 1000000.",
        ErrorCode::InvalidArgument => "Check the `details` field for the offending argument and its expected type/bounds.",
        ErrorCode::UrlNotFound => "The page returned 404. Verify the URL is correct.",
        ErrorCode::AccessDenied => "The server returned 403. Try a different antidetection profile or verify you are authorized to access this resource.",
        ErrorCode::RateLimited => "Increase rate_limit_delay or try again after N seconds.",
        ErrorCode::FetchError => "The upstream server returned an error after retries. Try again later.",
        ErrorCode::TimeoutError => "Increase timeout_seconds or try again; the upstream server was too slow to respond.",
        ErrorCode::ConnectionError => "Could not reach the host. Verify the URL and that the host is online.",
        ErrorCode::RobotsBlocked => "Call set_antidetection with respect_robots_txt=false to override.",
        ErrorCode::SelectorNotFound => "Call get_structure first to discover selectors.",
        ErrorCode::InvalidSelector => "Provide a syntactically valid CSS selector.",
        ErrorCode::EncodingError => "The page body could not be decoded; content was recovered with UTF-8 lossy replacement.",
        ErrorCode::ExtractionError => "The page HTML could not be parsed into structured content.",
        ErrorCode::SessionNotFound => "Verify the session_id; sessions are pruned by the housekeeper over time.",
        ErrorCode::InvalidChunkIndex => "Call get_session_info to discover total_chunks, then request an index in [0, total_chunks).",
        ErrorCode::ContentTooLarge => "Increase max_bytes or fetch individual chunks with get_session_chunk instead.",
        ErrorCode::AuthError => "Provide a valid token.",
        ErrorCode::PermissionDenied => "This session belongs to a different group than the caller's token.",
        ErrorCode::SsrfBlocked => "The target host resolves to a private or loopback address and was blocked.",
        ErrorCode::ParseError => "The crawl result could not be parsed into a feed; the raw crawl is still available.",
        ErrorCode::UnknownTool => "Check the tool name against the registered tool list.",
        ErrorCode::InternalError => "An unexpected internal error occurred; retry, and report if it persists.",
    }
}

/// A typed error carrying everything the dispatcher/REST boundary needs to
/// build the wire envelope: the stable code, a human message, and a
/// structured `details` map for programmatic consumers.
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn recovery(&self) -> &'static str {
        recovery_strategy(self.code)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_taxonomy_is_complete() {
        for &code in ErrorCode::ALL {
            let hint = recovery_strategy(code);
            assert!(!hint.is_empty(), "missing recovery string for {code}");
        }
    }

    #[test]
    fn wire_strings_are_screaming_snake_case() {
        for &code in ErrorCode::ALL {
            let s = code.as_str();
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
