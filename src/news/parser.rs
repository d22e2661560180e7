//! News parser (C10): turns a raw [`CrawlResult`] into a deduplicated,
//! classified [`Feed`] of stories, profile-driven so different publishers'
//! noise/label vocabularies can be swapped without touching the pipeline.

use crate::news::profile::{resolve, SourceProfile};
use crate::types::CrawlResult;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("crawl input is missing start_url, pages, or crawl_time_utc")]
    CrawlInputError,
    #[error("source profile error: {0}")]
    SourceProfileError(String),
    #[error("story reached dedup without a headline")]
    DeduplicationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    News,
    Opinion,
    Analysis,
    Video,
    Sponsored,
}

#[derive(Debug, Clone, Serialize)]
pub struct Story {
    pub story_id: String,
    pub headline: String,
    pub subheadline: Option<String>,
    pub section: Option<String>,
    pub content_type: ContentType,
    pub tags: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub published_raw: Option<String>,
    pub author: Option<String>,
    pub body_snippet: String,
    pub comment_count: Option<u64>,
    pub crawl_depth: u8,
    pub seen_on_pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub source_profile_name: String,
    pub crawl_time_utc: DateTime<Utc>,
    pub pages_crawled: usize,
    pub stories_extracted: usize,
    pub duplicates_removed: usize,
    pub noise_lines_stripped: usize,
    pub stories: Vec<Story>,
    pub warnings: Vec<String>,
    pub confidence: f64,
}

struct Block {
    page_url: String,
    crawl_depth: u8,
    date_anchor_line: String,
    lines: Vec<String>,
}

fn date_pattern_regex(profile: &SourceProfile) -> Result<Regex, ParseError> {
    let combined = profile.date_patterns.join("|");
    Regex::new(&combined).map_err(|e| ParseError::SourceProfileError(format!("bad date_patterns for profile '{}': {e}", profile.name)))
}

fn is_noise_line(line: &str, profile: &SourceProfile, duration_re: &Regex, photo_re: &Regex) -> bool {
    if profile.noise_markers.iter().any(|m| line.trim() == *m) {
        return true;
    }
    if photo_re.is_match(line) {
        return true;
    }
    if duration_re.is_match(line.trim()) {
        return true;
    }
    false
}

fn shared_duration_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}:\d{2}$").expect("static regex"))
}

fn shared_photo_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(Photo|Illustration):").expect("static regex"))
}

/// Strip noise lines from a page's text, skipping any line immediately
/// adjacent to a date-anchor line (the "story safety" rule) and recording a
/// warning when that skip happens.
fn strip_noise(text: &str, profile: &SourceProfile, date_re: &Regex, warnings: &mut Vec<String>) -> (Vec<String>, usize) {
    let raw_lines: Vec<&str> = text.lines().collect();
    let duration_re = shared_duration_re();
    let photo_re = shared_photo_re();

    let anchor_adjacent: Vec<bool> = raw_lines
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let prev_is_anchor = i > 0 && date_re.is_match(raw_lines[i - 1]);
            let next_is_anchor = i + 1 < raw_lines.len() && date_re.is_match(raw_lines[i + 1]);
            prev_is_anchor || next_is_anchor
        })
        .collect();

    let mut out = Vec::new();
    let mut stripped = 0usize;
    for (i, line) in raw_lines.iter().enumerate() {
        if is_noise_line(line, profile, duration_re, photo_re) {
            if anchor_adjacent[i] {
                warnings.push("STRIP_RULE_SKIPPED_STORY_SAFETY".to_string());
                out.push(line.to_string());
            } else {
                stripped += 1;
            }
            continue;
        }
        out.push(line.to_string());
    }
    (out, stripped)
}

fn segment_into_blocks(page_url: &str, crawl_depth: u8, lines: &[String], date_re: &Regex) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current_anchor: Option<String> = None;
    let mut current_lines: Vec<String> = Vec::new();

    for line in lines {
        if date_re.is_match(line) {
            if let Some(anchor) = current_anchor.take() {
                blocks.push(Block { page_url: page_url.to_string(), crawl_depth, date_anchor_line: anchor, lines: std::mem::take(&mut current_lines) });
            } else {
                current_lines.clear();
            }
            current_anchor = Some(line.clone());
        } else {
            current_lines.push(line.clone());
        }
    }
    if let Some(anchor) = current_anchor {
        blocks.push(Block { page_url: page_url.to_string(), crawl_depth, date_anchor_line: anchor, lines: current_lines });
    }
    blocks
}

struct Headline {
    section: Option<String>,
    headline: String,
    subheadline: Option<String>,
    is_opinion: bool,
}

fn select_headline(block: &Block, profile: &SourceProfile) -> Option<Headline> {
    let mut section = None;
    let mut idx = 0;
    let pre_date: Vec<&String> = block.lines.iter().filter(|l| !l.trim().is_empty()).collect();

    while idx < pre_date.len() {
        let line = pre_date[idx].trim();
        if profile.section_labels.iter().any(|l| l.eq_ignore_ascii_case(line)) {
            section = Some(line.to_string());
            idx += 1;
        } else {
            break;
        }
    }

    if idx >= pre_date.len() {
        return None;
    }

    for line in &pre_date[idx..] {
        if let Some((prefix, rest)) = line.split_once('|') {
            let prefix_trim = prefix.trim();
            if profile.opinion_labels.iter().any(|l| l.eq_ignore_ascii_case(prefix_trim)) {
                return Some(Headline { section, headline: rest.trim().to_string(), subheadline: None, is_opinion: true });
            }
        }
    }

    let candidate = pre_date[idx];
    let headline = candidate.trim().to_string();
    let subheadline = pre_date
        .get(idx + 1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !profile.section_labels.iter().any(|l| l.eq_ignore_ascii_case(s)));

    Some(Headline { section, headline, subheadline, is_opinion: false })
}

fn normalize_date(raw: &str, profile: &SourceProfile, crawl_time_utc: DateTime<Utc>, warnings: &mut Vec<String>) -> Option<DateTime<Utc>> {
    static RELATIVE_RE: OnceCell<Regex> = OnceCell::new();
    static ABSOLUTE_RE: OnceCell<Regex> = OnceCell::new();
    let relative_re = RELATIVE_RE.get_or_init(|| Regex::new(r"(\d+)\s+(minute|hour|day)s?\s+ago").expect("static regex"));
    let absolute_re = ABSOLUTE_RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+(\d{4})\s*-\s*(\d{1,2}):(\d{2})(AM|PM)").expect("static regex")
    });

    if let Some(caps) = relative_re.captures(raw) {
        let n: i64 = caps[1].parse().ok()?;
        let unit = &caps[2];
        let duration = match unit {
            "minute" => ChronoDuration::minutes(n),
            "hour" => ChronoDuration::hours(n),
            "day" => ChronoDuration::days(n),
            _ => return None,
        };
        return Some(crawl_time_utc - duration);
    }

    if let Some(caps) = absolute_re.captures(raw) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        let mut hour: u32 = caps[4].parse().ok()?;
        let minute: u32 = caps[5].parse().ok()?;
        let is_pm = &caps[6] == "PM";
        if is_pm && hour != 12 {
            hour += 12;
        } else if !is_pm && hour == 12 {
            hour = 0;
        }
        let offset = FixedOffset::east_opt(profile.utc_offset_hours * 3600)?;
        let local = offset.with_ymd_and_hms(year, month, day, hour, minute, 0).single()?;
        return Some(local.with_timezone(&Utc));
    }

    warnings.push("DATE_PARSE_FAILED".to_string());
    None
}

fn month_number(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    MONTHS.iter().position(|m| *m == abbrev).map(|i| i as u32 + 1)
}

fn date_bucket(published: Option<DateTime<Utc>>, raw: &str) -> String {
    match published {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => raw.to_string(),
    }
}

fn classify(headline: &str, subheadline: Option<&str>, is_opinion: bool, pre_headline_text: &str, profile: &SourceProfile, video_preceded: bool) -> (ContentType, Vec<String>) {
    let mut tags = Vec::new();
    let combined = format!("{headline} {}", subheadline.unwrap_or(""));

    let content_type = if profile.sponsored_markers.iter().any(|m| pre_headline_text.contains(m)) {
        ContentType::Sponsored
    } else if is_opinion {
        ContentType::Opinion
    } else if Regex::new(r"(?i)analysis|deep dive|explainer").unwrap().is_match(&combined) {
        ContentType::Analysis
    } else if video_preceded {
        ContentType::Video
    } else {
        ContentType::News
    };

    if profile.exclusive_markers.iter().any(|m| pre_headline_text.contains(m)) {
        tags.push("exclusive".to_string());
    }

    (content_type, tags)
}

fn find_opinion_author(pre_headline_lines: &[&String]) -> Option<String> {
    static NAME_RE: OnceCell<Regex> = OnceCell::new();
    let name_re = NAME_RE.get_or_init(|| Regex::new(r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})$").expect("static regex"));
    pre_headline_lines.iter().rev().find_map(|l| name_re.captures(l.trim()).map(|c| c[1].to_string()))
}

fn richness_score(story: &Story) -> f64 {
    let has_subheadline = story.subheadline.is_some() as i32 as f64;
    let has_comment_count = story.comment_count.is_some() as i32 as f64;
    has_subheadline + has_comment_count + story.body_snippet.len() as f64 / 1000.0 + story.tags.len() as f64
}

fn story_id(profile_name: &str, normalized_headline: &str, bucket: &str, section: Option<&str>) -> String {
    let key = format!("{profile_name}|{normalized_headline}|{bucket}|{}", section.unwrap_or(""));
    format!("{:016x}", xxh3_64(key.as_bytes()))
}

fn normalize_headline(h: &str) -> String {
    h.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse(crawl: &CrawlResult, crawl_time_utc: DateTime<Utc>, source_profile_name: Option<&str>) -> Result<Feed, ParseError> {
    if crawl.start_url.is_empty() || crawl.pages.is_empty() {
        return Err(ParseError::CrawlInputError);
    }

    let mut warnings = Vec::new();
    let used_generic_fallback = source_profile_name.map(|n| !crate::news::profile::is_registered(n)).unwrap_or(true);
    let profile = resolve(source_profile_name);
    let date_re = date_pattern_regex(profile)?;

    let mut all_blocks = Vec::new();
    let mut noise_lines_stripped = 0usize;
    for page in &crawl.pages {
        let (stripped, dropped) = strip_noise(&page.text, profile, &date_re, &mut warnings);
        noise_lines_stripped += dropped;
        let blocks = segment_into_blocks(&page.url, page.depth, &stripped, &date_re);
        all_blocks.extend(blocks);
    }

    let mut stories: Vec<Story> = Vec::new();
    let mut fallback_segmentation_used = false;

    for block in &all_blocks {
        let Some(parsed_headline) = select_headline(block, profile) else {
            fallback_segmentation_used = true;
            continue;
        };

        let pre_date_text = block.lines.join(" ");
        let video_preceded = shared_duration_re().is_match(block.date_anchor_line.trim()) || block.lines.iter().any(|l| shared_duration_re().is_match(l.trim()));
        let (content_type, mut tags) = classify(&parsed_headline.headline, parsed_headline.subheadline.as_deref(), parsed_headline.is_opinion, &pre_date_text, profile, video_preceded);

        let pre_date_lines: Vec<&String> = block.lines.iter().filter(|l| !l.trim().is_empty()).collect();
        let author = if parsed_headline.is_opinion { find_opinion_author(&pre_date_lines) } else { None };

        let published = normalize_date(&block.date_anchor_line, profile, crawl_time_utc, &mut warnings);
        let published_raw = Some(block.date_anchor_line.clone());

        if matches!(content_type, ContentType::Sponsored) {
            tags.push("sponsored".to_string());
        }

        let story = Story {
            story_id: String::new(),
            headline: parsed_headline.headline,
            subheadline: parsed_headline.subheadline,
            section: parsed_headline.section,
            content_type,
            tags,
            published,
            published_raw,
            author,
            body_snippet: pre_date_text.chars().take(280).collect(),
            comment_count: None,
            crawl_depth: block.crawl_depth,
            seen_on_pages: vec![block.page_url.clone()],
        };
        stories.push(story);
    }

    let stories_before_dedup = stories.len();
    let deduped = dedup(stories, profile.name)?;
    let duplicates_removed = stories_before_dedup.saturating_sub(deduped.len());

    let mut missing_headline = 0usize;
    let mut missing_section = 0usize;
    let mut missing_published = 0usize;
    let mut missing_subheadline = 0usize;
    for s in &deduped {
        if s.headline.trim().is_empty() {
            missing_headline += 1;
        }
        if s.section.is_none() {
            missing_section += 1;
        }
        if s.published.is_none() {
            missing_published += 1;
        }
        if s.subheadline.is_none() {
            missing_subheadline += 1;
        }
    }

    let total = deduped.len().max(1) as f64;
    let mut confidence = 1.0;
    confidence -= 0.3 * (missing_headline as f64 / total);
    confidence -= 0.1 * (missing_section as f64 / total);
    confidence -= 0.15 * (missing_published as f64 / total);
    confidence -= 0.05 * (missing_subheadline as f64 / total);
    if fallback_segmentation_used {
        confidence -= 0.1;
    }
    if used_generic_fallback {
        confidence -= 0.05;
    }
    confidence = confidence.clamp(0.0, 1.0);

    Ok(Feed {
        source_profile_name: profile.name.to_string(),
        crawl_time_utc,
        pages_crawled: crawl.pages.len(),
        stories_extracted: deduped.len(),
        duplicates_removed,
        noise_lines_stripped,
        stories: deduped,
        warnings,
        confidence,
    })
}

/// Cascading fallback keys for one story, most specific first:
/// `(headline, bucket, section)` -> `(headline, bucket)` -> `(headline,)`.
/// Two blocks of the same underlying story where only one got a section
/// detected still collide on the `(headline, bucket)` fallback.
fn dedup_keys(norm_headline: &str, bucket: &str, section: Option<&str>) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if let Some(section) = section {
        keys.push(format!("{norm_headline}|{bucket}|{section}"));
    }
    keys.push(format!("{norm_headline}|{bucket}"));
    keys.push(norm_headline.to_string());
    keys
}

fn dedup(stories: Vec<Story>, profile_name: &str) -> Result<Vec<Story>, ParseError> {
    let mut slots: Vec<Story> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for mut story in stories {
        if story.headline.trim().is_empty() {
            return Err(ParseError::DeduplicationError);
        }
        let norm_headline = normalize_headline(&story.headline);
        let bucket = date_bucket(story.published, story.published_raw.as_deref().unwrap_or(""));
        let keys = dedup_keys(&norm_headline, &bucket, story.section.as_deref());

        story.story_id = story_id(profile_name, &norm_headline, &bucket, story.section.as_deref());

        let existing_index = keys.iter().find_map(|k| by_key.get(k).copied());

        match existing_index {
            None => {
                let index = slots.len();
                for key in keys {
                    by_key.entry(key).or_insert(index);
                }
                slots.push(story);
            }
            Some(index) => {
                let existing = &mut slots[index];
                let keep_new = story.crawl_depth < existing.crawl_depth
                    || (story.crawl_depth == existing.crawl_depth && richness_score(&story) > richness_score(existing));
                let mut merged_pages = existing.seen_on_pages.clone();
                merged_pages.extend(story.seen_on_pages.clone());
                merged_pages.sort();
                merged_pages.dedup();

                if keep_new {
                    story.seen_on_pages = merged_pages;
                    *existing = story;
                } else {
                    existing.seen_on_pages = merged_pages;
                }

                for key in keys {
                    by_key.entry(key).or_insert(index);
                }
            }
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CrawlSummary, PageContent};
    use std::collections::HashMap as StdHashMap;

    fn page(url: &str, text: &str, depth: u8) -> PageContent {
        PageContent {
            url: url.to_string(),
            title: None,
            text: text.to_string(),
            links: vec![],
            headings: vec![],
            images: vec![],
            meta: StdHashMap::new(),
            language: None,
            depth,
        }
    }

    fn crawl_with(pages: Vec<PageContent>) -> CrawlResult {
        CrawlResult {
            start_url: "https://example.com/".to_string(),
            pages,
            failed: vec![],
            summary: CrawlSummary::default(),
        }
    }

    #[test]
    fn parses_a_simple_news_story() {
        let text = "News\nMarkets rally on earnings\nStocks close higher across the board.\n13 Feb 2026 - 10:15PM";
        let crawl = crawl_with(vec![page("https://example.com/markets", text, 1)]);
        let feed = parse(&crawl, Utc::now(), None).unwrap();
        assert_eq!(feed.stories.len(), 1);
        let story = &feed.stories[0];
        assert_eq!(story.headline, "Markets rally on earnings");
        assert_eq!(story.section.as_deref(), Some("News"));
        assert!(story.published.is_some());
        assert_eq!(story.content_type as i32, ContentType::News as i32);
    }

    #[test]
    fn opinion_story_extracts_author_and_label() {
        let text = "Opinion\nJane Smith\nOpinion | Why markets will recover\nThe recovery is coming sooner than expected.\n2 hours ago";
        let crawl = crawl_with(vec![page("https://example.com/opinion", text, 1)]);
        let feed = parse(&crawl, Utc::now(), None).unwrap();
        assert_eq!(feed.stories.len(), 1);
        let story = &feed.stories[0];
        assert_eq!(story.content_type as i32, ContentType::Opinion as i32);
        assert_eq!(story.author.as_deref(), Some("Jane Smith"));
    }

    #[test]
    fn relative_date_is_resolved_against_crawl_time() {
        let crawl_time = Utc.with_ymd_and_hms(2026, 2, 13, 12, 0, 0).unwrap();
        let text = "Breaking update on the story\nMore details follow.\n3 hours ago";
        let crawl = crawl_with(vec![page("https://example.com/x", text, 1)]);
        let feed = parse(&crawl, crawl_time, None).unwrap();
        assert_eq!(feed.stories[0].published, Some(crawl_time - ChronoDuration::hours(3)));
    }

    #[test]
    fn dedups_same_headline_same_bucket_same_section() {
        let text = "News\nBreaking story headline\nBody one.\n13 Feb 2026 - 10:15PM";
        let crawl = crawl_with(vec![
            page("https://example.com/page1", text, 1),
            page("https://example.com/page2", text, 2),
        ]);
        let feed = parse(&crawl, Utc::now(), None).unwrap();
        assert_eq!(feed.stories.len(), 1);
        assert_eq!(feed.stories[0].crawl_depth, 1);
        assert_eq!(feed.stories[0].seen_on_pages.len(), 2);
    }

    #[test]
    fn dedups_across_the_section_fallback_when_only_one_block_has_a_detected_section() {
        let with_section = "News\nBreaking story headline\nBody one.\n13 Feb 2026 - 10:15PM";
        let without_section = "Breaking story headline\nBody one.\n13 Feb 2026 - 10:15PM";
        let crawl = crawl_with(vec![
            page("https://example.com/page1", with_section, 1),
            page("https://example.com/page2", without_section, 1),
        ]);
        let feed = parse(&crawl, Utc::now(), None).unwrap();
        assert_eq!(feed.stories.len(), 1, "both blocks are the same story and must collapse via the (headline, bucket) fallback");
        assert_eq!(feed.duplicates_removed, 1);
    }

    #[test]
    fn empty_pages_is_a_crawl_input_error() {
        let crawl = crawl_with(vec![]);
        let err = parse(&crawl, Utc::now(), None).unwrap_err();
        assert!(matches!(err, ParseError::CrawlInputError));
    }

    #[test]
    fn unknown_profile_falls_back_to_generic_and_lowers_confidence() {
        let text = "News\nSome headline here\nSome body.\n13 Feb 2026 - 10:15PM";
        let crawl = crawl_with(vec![page("https://example.com/x", text, 1)]);
        let feed = parse(&crawl, Utc::now(), Some("totally-unknown-publisher")).unwrap();
        assert_eq!(feed.source_profile_name, "generic");
        assert!(feed.confidence < 1.0);
    }
}
