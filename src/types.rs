//! Core data model: the types shared across components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single fetch request, validated before it reaches the fetcher.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub profile: String,
    pub selector: Option<String>,
    pub timeout_seconds: u64,
    pub respect_robots: bool,
}

/// Outcome of a single fetch attempt. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub http_status: Option<u16>,
    pub content_bytes: usize,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    #[serde(skip)]
    pub body: String,
    pub headers: HashMap<String, String>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub rate_limited: bool,
}

/// A heading extracted from `h1`..`h6`, in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// A single hyperlink, with `href` resolved to an absolute URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Extracted page content (C5 output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<Link>,
    pub headings: Vec<Heading>,
    pub images: Vec<String>,
    pub meta: HashMap<String, String>,
    pub language: Option<String>,
    /// Crawl depth this page was discovered at (1-based). `0` for a single
    /// ad-hoc fetch that never went through the crawler.
    #[serde(default)]
    pub depth: u8,
}

/// A section record from the structure analyzer (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub children_count: usize,
}

/// A detected HTML form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormInfo {
    pub action: Option<String>,
    pub method: String,
    pub field_count: usize,
}

/// Output of the structure analyzer (C6): page shape without body text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub url: String,
    pub sections: Vec<SectionInfo>,
    pub navigation: Vec<Link>,
    pub internal_links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub forms: Vec<FormInfo>,
    pub outline: Vec<Heading>,
}

/// A page that failed during a crawl; preserved as a placeholder rather than
/// aborting the whole crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPage {
    pub url: String,
    pub depth: u8,
    pub error: String,
}

/// Aggregated crawl summary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrawlSummary {
    pub total_pages: usize,
    pub total_text_length: usize,
    pub pages_by_depth: HashMap<u8, usize>,
}

/// Output of the crawler (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub start_url: String,
    pub pages: Vec<PageContent>,
    pub failed: Vec<FailedPage>,
    pub summary: CrawlSummary,
}

/// Content kind stored in a session, used to decide how `get_session`
/// materializes joined content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionContentType {
    RawCrawl,
    ParsedFeed,
    Structure,
}

impl SessionContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionContentType::RawCrawl => "raw_crawl",
            SessionContentType::ParsedFeed => "parsed_feed",
            SessionContentType::Structure => "structure",
        }
    }
}

/// Session metadata record. Content itself lives in the blob store,
/// addressed by `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub url: String,
    pub group: Option<String>,
    pub created_at: DateTime<Utc>,
    pub chunk_size: usize,
    pub total_chunks: usize,
    pub total_size_bytes: usize,
    pub content_type: SessionContentType,
}

/// Lightweight summary used by `list_sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub url: String,
    pub group: Option<String>,
    pub created_at: DateTime<Utc>,
    pub total_chunks: usize,
    pub total_size_bytes: usize,
    pub content_type: SessionContentType,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.session_id.clone(),
            url: s.url.clone(),
            group: s.group.clone(),
            created_at: s.created_at,
            total_chunks: s.total_chunks,
            total_size_bytes: s.total_size_bytes,
            content_type: s.content_type,
        }
    }
}

/// Token claims consumed from the external `TokenVerifier` collaborator.
/// `groups[0]` is the primary group, used to tag newly created sessions;
/// the full set is what authorizes session reads (any-group match).
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub groups: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

// News-parser input/output types live in `news::parser`; `Story`/`Feed`
// are re-exported from there via `crate::news`.
