//! End-to-end scenarios exercising the dispatcher against a real (mocked)
//! HTTP server and the filesystem-backed session store.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use webscout_tools::antidetect::AntiDetectState;
use webscout_tools::auth::TokenVerifier;
use webscout_tools::dispatcher::{dispatch, AppState};
use webscout_tools::error::{AppError, ErrorCode};
use webscout_tools::fetcher::{HttpFetcher, ReqwestFetcher};
use webscout_tools::news;
use webscout_tools::rate_limiter::RateLimiter;
use webscout_tools::robots::{ReqwestRobotsFetcher, RobotsCache};
use webscout_tools::session::{FsBlobStore, FsMetadataIndex, SessionStore};
use webscout_tools::types::{CrawlResult, CrawlSummary, PageContent, TokenInfo};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A test-only [`TokenVerifier`] mapping fixed bearer tokens to groups.
struct MapTokenVerifier {
    tokens: HashMap<&'static str, Vec<&'static str>>,
}

#[async_trait::async_trait]
impl TokenVerifier for MapTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TokenInfo, AppError> {
        let groups = self.tokens.get(token).ok_or_else(|| AppError::new(ErrorCode::AuthError, "unknown token"))?;
        Ok(TokenInfo {
            groups: groups.iter().map(|g| g.to_string()).collect(),
            expires_at: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        })
    }
}

async fn make_state(dir: &std::path::Path, verifier: Arc<dyn TokenVerifier>) -> AppState {
    let antidetect = Arc::new(AntiDetectState::new());
    let robots = Arc::new(RobotsCache::new(ReqwestRobotsFetcher::new(reqwest::Client::new())));
    let rate_limiter = Arc::new(RateLimiter::new());
    // Points at a wiremock loopback server, so the production SSRF guard
    // (which would otherwise reject every 127.0.0.1 request) is relaxed here.
    let fetcher = Arc::new(HttpFetcher::new_allowing_private_hosts(ReqwestFetcher::new(), robots, rate_limiter, antidetect.clone()));
    let blobs = FsBlobStore::new(dir.join("blobs"));
    let metadata = FsMetadataIndex::load(dir.join("metadata.json")).await.unwrap();
    let session_store = Arc::new(SessionStore::new(blobs, metadata));
    AppState {
        antidetect,
        fetcher,
        session_store,
        token_verifier: verifier,
        housekeeper_alive: Arc::new(std::sync::atomic::AtomicBool::new(true)),
    }
}

fn no_auth_verifier() -> Arc<dyn TokenVerifier> {
    Arc::new(MapTokenVerifier { tokens: HashMap::new() })
}

/// S1 — rate limit gate: with `rate_limit_delay=0.5s`, two sequential
/// `get_content` calls to the same host must have the second start at least
/// 500ms after the first.
#[tokio::test]
async fn s1_rate_limit_gate_delays_second_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/a")).respond_with(ResponseTemplate::new(200).set_body_string("<html><body>a</body></html>")).mount(&server).await;
    Mock::given(method("GET")).and(path("/b")).respond_with(ResponseTemplate::new(200).set_body_string("<html><body>b</body></html>")).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), no_auth_verifier()).await;

    let set_result = dispatch(&state, "set_antidetection", json!({"profile": "none", "rate_limit_delay": 0.5})).await;
    assert_eq!(set_result["success"], json!(true));

    let start = Instant::now();
    let a = dispatch(&state, "get_content", json!({"url": format!("{}/a", server.uri())})).await;
    assert_eq!(a["success"], json!(true), "first fetch failed: {a:?}");
    let b = dispatch(&state, "get_content", json!({"url": format!("{}/b", server.uri())})).await;
    assert_eq!(b["success"], json!(true), "second fetch failed: {b:?}");
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "expected at least 500ms between sequential fetches to the same host, got {elapsed:?}");
}

/// S2 — depth-2 crawl: seed links to three internal pages and one external
/// host; with `max_pages_per_level=2` only the seed plus two internal pages
/// are visited.
#[tokio::test]
async fn s2_depth_two_crawl_caps_pages_per_level_and_excludes_external_host() {
    let server = MockServer::start().await;
    let seed_html = format!(
        "<html><body><a href=\"{0}/a\">a</a><a href=\"{0}/b\">b</a><a href=\"{0}/c\">c</a><a href=\"http://external-host.example/x\">ext</a></body></html>",
        server.uri()
    );
    Mock::given(method("GET")).and(path("/")).respond_with(ResponseTemplate::new(200).set_body_string(seed_html)).mount(&server).await;
    for p in ["/a", "/b", "/c"] {
        Mock::given(method("GET")).and(path(p)).respond_with(ResponseTemplate::new(200).set_body_string("<html><body>leaf</body></html>")).mount(&server).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), no_auth_verifier()).await;
    dispatch(&state, "set_antidetection", json!({"profile": "none", "rate_limit_delay": 0.1})).await;

    let result = dispatch(
        &state,
        "get_content",
        json!({"url": format!("{}/", server.uri()), "depth": 2, "max_pages_per_level": 2, "parse_results": false}),
    )
    .await;
    assert_eq!(result["success"], json!(true), "crawl failed: {result:?}");
    assert_eq!(result["response_type"], json!("session"));
    let session_id = result["session_id"].as_str().unwrap().to_string();

    let full = dispatch(&state, "get_session", json!({"session_id": session_id})).await;
    assert_eq!(full["success"], json!(true));
    let crawl: CrawlResult = serde_json::from_str(full["content"].as_str().unwrap()).unwrap();
    assert_eq!(crawl.summary.total_pages, 3, "expected seed + 2 capped internal pages, got {:?}", crawl.summary);
}

/// S3 — session chunking: 10,001 bytes of content with `chunk_size=4000`
/// yields 3 chunks, and the last chunk is 2001 bytes.
#[tokio::test]
async fn s3_session_chunking_splits_and_reassembles_content() {
    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), no_auth_verifier()).await;

    let content = "x".repeat(10_001);
    let session_id = state
        .session_store
        .create(content.as_bytes(), "https://example.com/doc", None, 4000, webscout_tools::types::SessionContentType::RawCrawl)
        .await
        .unwrap();

    let info = dispatch(&state, "get_session_info", json!({"session_id": session_id})).await;
    assert_eq!(info["session"]["total_chunks"], json!(3));

    let chunk2 = dispatch(&state, "get_session_chunk", json!({"session_id": session_id, "chunk_index": 2})).await;
    assert_eq!(chunk2["success"], json!(true));
    let chunk2_content = chunk2["content"].as_str().unwrap();
    assert_eq!(chunk2_content.len(), 2001);

    let mut reassembled = String::new();
    for i in 0..3 {
        let c = dispatch(&state, "get_session_chunk", json!({"session_id": session_id, "chunk_index": i})).await;
        reassembled.push_str(c["content"].as_str().unwrap());
    }
    assert_eq!(reassembled, content);
}

/// S4 — group ACL: a session created under group `a` is visible to a token
/// scoped to `a` or to a multi-group token listing `a` anywhere (not just
/// first), but not to a token scoped only to `b`.
#[tokio::test]
async fn s4_group_acl_denies_other_groups_and_allows_multi_group_tokens() {
    let mut tokens = HashMap::new();
    tokens.insert("T_a", vec!["a"]);
    tokens.insert("T_b", vec!["b"]);
    tokens.insert("T_m", vec!["b", "a"]);
    let verifier: Arc<dyn TokenVerifier> = Arc::new(MapTokenVerifier { tokens });

    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), verifier).await;

    let session_id = state
        .session_store
        .create(b"secret content", "https://example.com/doc", Some("a".to_string()), 4000, webscout_tools::types::SessionContentType::RawCrawl)
        .await
        .unwrap();

    let denied = dispatch(&state, "get_session_info", json!({"session_id": session_id, "auth_token": "T_b"})).await;
    assert_eq!(denied["success"], json!(false));
    assert_eq!(denied["error_code"], json!("PERMISSION_DENIED"));

    let allowed_same_group = dispatch(&state, "get_session_info", json!({"session_id": session_id, "auth_token": "T_a"})).await;
    assert_eq!(allowed_same_group["success"], json!(true));

    let allowed_multi_group = dispatch(&state, "get_session_info", json!({"session_id": session_id, "auth_token": "T_m"})).await;
    assert_eq!(allowed_multi_group["success"], json!(true));
}

fn page(url: &str, text: &str, depth: u8) -> PageContent {
    PageContent {
        url: url.to_string(),
        title: None,
        text: text.to_string(),
        links: vec![],
        headings: vec![],
        images: vec![],
        meta: HashMap::new(),
        language: None,
        depth,
    }
}

/// S5 — news parser happy path: a two-page SCMP-shaped crawl with one
/// opinion story (with author) and one duplicate across pages yields two
/// stories and one removed duplicate.
#[tokio::test]
async fn s5_news_parser_extracts_and_dedups_scmp_shaped_stories() {
    let news_story = "News\nHong Kong markets close higher\nLed by tech and property stocks.\n13 Feb 2026 - 10:15PM";
    let opinion_story = "Opinion\nAlice Wong\nMy Take | Why the rally will not last\nThe fundamentals tell a different story.\n13 Feb 2026 - 11:00PM";

    let page1_text = format!("{news_story}\n\n{opinion_story}");
    let page2_text = news_story.to_string();

    let crawl = CrawlResult {
        start_url: "https://example.com/".to_string(),
        pages: vec![page("https://example.com/page1", &page1_text, 1), page("https://example.com/page2", &page2_text, 2)],
        failed: vec![],
        summary: CrawlSummary::default(),
    };

    let feed = news::parse(&crawl, Utc::now(), Some("scmp")).unwrap();

    assert_eq!(feed.stories_extracted, 2);
    assert_eq!(feed.duplicates_removed, 1);

    let opinion = feed.stories.iter().find(|s| matches!(s.content_type, news::ContentType::Opinion)).expect("expected one opinion story");
    assert_eq!(opinion.author.as_deref(), Some("Alice Wong"));
}

/// S6 — robots override: a default-config fetch against a disallowed path
/// is blocked, and setting `respect_robots_txt=false` lets the same call
/// through.
#[tokio::test]
async fn s6_robots_override_lets_blocked_path_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /foo\n")).mount(&server).await;
    Mock::given(method("GET")).and(path("/foo")).respond_with(ResponseTemplate::new(200).set_body_string("<html><body>secret</body></html>")).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), no_auth_verifier()).await;
    dispatch(&state, "set_antidetection", json!({"profile": "none", "rate_limit_delay": 0.1})).await;

    let blocked = dispatch(&state, "get_content", json!({"url": format!("{}/foo", server.uri())})).await;
    assert_eq!(blocked["success"], json!(false));
    assert_eq!(blocked["error_code"], json!("ROBOTS_BLOCKED"));

    let override_result = dispatch(&state, "set_antidetection", json!({"profile": "none", "respect_robots_txt": false})).await;
    assert_eq!(override_result["success"], json!(true));

    let allowed = dispatch(&state, "get_content", json!({"url": format!("{}/foo", server.uri())})).await;
    assert_eq!(allowed["success"], json!(true), "expected fetch to proceed once robots is overridden: {allowed:?}");
}

/// S7 — redirect: fetching a path that 302s to another path reports the
/// post-redirect URL as the content's URL, not the originally requested one.
#[tokio::test]
async fn s7_fetch_reports_final_url_after_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", format!("{}/new", server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/new")).respond_with(ResponseTemplate::new(200).set_body_string("<html><body>landed</body></html>")).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state = make_state(dir.path(), no_auth_verifier()).await;

    let result = dispatch(&state, "get_content", json!({"url": format!("{}/old", server.uri())})).await;
    assert_eq!(result["success"], json!(true), "fetch failed: {result:?}");
    assert_eq!(result["content"]["url"], json!(format!("{}/new", server.uri())));
}
