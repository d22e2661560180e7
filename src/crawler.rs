//! Crawler (C7): depth-bounded breadth-first traversal of same-site pages.
//!
//! Delegates individual page fetches to the fetcher (C4, which already
//! applies robots + rate limiting) and content extraction to C5; this module
//! owns only frontier management, dedup, and depth bookkeeping.

use crate::error::AppError;
use crate::extractor;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::robots::RobotsFetcher;
use crate::types::{CrawlResult, CrawlSummary, FailedPage, FetchRequest, PageContent};
use std::collections::{HashMap, HashSet};

pub const DEPTH_BOUNDS: (u8, u8) = (1, 3);
pub const MAX_PAGES_PER_LEVEL_BOUNDS: (usize, usize) = (1, 20);

pub struct CrawlRequest {
    pub start_url: String,
    pub depth: u8,
    pub max_pages_per_level: usize,
    pub profile: String,
    pub timeout_seconds: u64,
    pub respect_robots: bool,
}

pub async fn crawl<F: Fetcher, R: RobotsFetcher>(http: &HttpFetcher<F, R>, req: &CrawlRequest) -> Result<CrawlResult, AppError> {
    let depth = req.depth.clamp(DEPTH_BOUNDS.0, DEPTH_BOUNDS.1);
    let max_per_level = req.max_pages_per_level.clamp(MAX_PAGES_PER_LEVEL_BOUNDS.0, MAX_PAGES_PER_LEVEL_BOUNDS.1);

    let start_normalized = normalize_url(&req.start_url).unwrap_or_else(|| req.start_url.clone());
    let start_registrable_host = registrable_host(&req.start_url);

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start_normalized);

    let mut frontier = vec![req.start_url.clone()];
    let mut pages: Vec<PageContent> = Vec::new();
    let mut failed: Vec<FailedPage> = Vec::new();

    for level in 1..=depth {
        let mut next_links: Vec<String> = Vec::new();

        for url in &frontier {
            let fetch_req = FetchRequest {
                url: url.clone(),
                profile: req.profile.clone(),
                selector: None,
                timeout_seconds: req.timeout_seconds,
                respect_robots: req.respect_robots,
            };

            match http.fetch(&fetch_req).await {
                Ok(result) if result.error.is_none() => {
                    match extractor::extract(&result.body, &result.final_url, None) {
                        Ok(mut content) => {
                            content.depth = level;
                            if level < depth {
                                next_links.extend(content.links.iter().map(|l| l.href.clone()));
                            }
                            pages.push(content);
                        }
                        Err(e) => failed.push(FailedPage { url: url.clone(), depth: level, error: e.code.as_str().to_string() }),
                    }
                }
                Ok(result) => {
                    failed.push(FailedPage {
                        url: url.clone(),
                        depth: level,
                        error: result.error.unwrap_or_else(|| "FETCH_ERROR".to_string()),
                    });
                }
                Err(e) => {
                    failed.push(FailedPage { url: url.clone(), depth: level, error: e.code.as_str().to_string() });
                }
            }
        }

        if level < depth {
            let mut deduped = Vec::new();
            for link in next_links {
                if registrable_host(&link) != start_registrable_host {
                    continue;
                }
                let Some(scheme) = url::Url::parse(&link).ok().map(|u| u.scheme().to_string()) else { continue };
                if scheme != "http" && scheme != "https" {
                    continue;
                }
                let Some(norm) = normalize_url(&link) else { continue };
                if visited.contains(&norm) {
                    continue;
                }
                visited.insert(norm);
                deduped.push(link);
                if deduped.len() >= max_per_level {
                    break;
                }
            }
            frontier = deduped;
            if frontier.is_empty() {
                break;
            }
        }
    }

    let mut pages_by_depth: HashMap<u8, usize> = HashMap::new();
    let mut total_text_length = 0usize;
    for page in &pages {
        *pages_by_depth.entry(page.depth).or_insert(0) += 1;
        total_text_length += page.text.len();
    }

    Ok(CrawlResult {
        start_url: req.start_url.clone(),
        summary: CrawlSummary {
            total_pages: pages.len(),
            total_text_length,
            pages_by_depth,
        },
        pages,
        failed,
    })
}

/// Lowercase scheme+host, strip fragment, collapse a lone trailing `/`, sort
/// query keys. Two URLs that normalize equal are treated as the same page.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw).ok()?;
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    pairs.sort();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let query = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        parsed.set_query(Some(&query));
    }

    let scheme = parsed.scheme().to_lowercase();
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    let mut out = format!("{scheme}://{host}{path}");
    if let Some(q) = parsed.query() {
        out.push('?');
        out.push_str(q);
    }
    Some(out)
}

/// Best-effort registrable-host comparison: last two dot-separated labels,
/// so `blog.example.com` and `www.example.com` are considered the same site.
/// Not a full public-suffix-list implementation.
fn registrable_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        Some(host.to_lowercase())
    } else {
        Some(labels[labels.len() - 2..].join(".").to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fragment_and_sorts_query() {
        let a = normalize_url("HTTPS://Example.com/path/?b=2&a=1#section").unwrap();
        let b = normalize_url("https://example.com/path?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_collapses_trailing_slash() {
        let a = normalize_url("https://example.com/path/").unwrap();
        let b = normalize_url("https://example.com/path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn root_path_slash_is_preserved() {
        let out = normalize_url("https://example.com/").unwrap();
        assert_eq!(out, "https://example.com/");
    }

    #[test]
    fn registrable_host_ignores_subdomain() {
        assert_eq!(registrable_host("https://blog.example.com/x"), registrable_host("https://www.example.com/y"));
        assert_ne!(registrable_host("https://example.com/x"), registrable_host("https://other.com/y"));
    }
}
