//! Content extractor (C5): HTML + base URL + optional CSS selector scope ->
//! title, visible text, links, headings, images, meta tags.
//!
//! Built on `scraper` (html5ever under the hood); no JavaScript execution.

use crate::error::{AppError, ErrorCode};
use crate::types::{Heading, Link, PageContent};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "header", "footer", "blockquote", "pre",
];

pub fn extract(html: &str, base_url: &str, selector: Option<&str>) -> Result<PageContent, AppError> {
    let document = Html::parse_document(html);
    let base = url::Url::parse(base_url).map_err(|e| AppError::new(ErrorCode::InvalidUrl, format!("invalid base url: {e}")))?;

    let scope_root: Option<ElementRef> = match selector {
        Some(sel) => {
            let parsed = Selector::parse(sel).map_err(|e| {
                AppError::new(ErrorCode::InvalidSelector, format!("invalid css selector '{sel}': {e:?}"))
            })?;
            let found = document.select(&parsed).next();
            match found {
                Some(el) => Some(el),
                None => return Err(AppError::new(ErrorCode::SelectorNotFound, format!("selector '{sel}' matched no elements"))),
            }
        }
        None => None,
    };

    let title = extract_title(&document);
    let text = match scope_root {
        Some(el) => extract_text(el),
        None => extract_text(document.root_element()),
    };
    let links = match scope_root {
        Some(el) => extract_links(el, &base),
        None => extract_links(document.root_element(), &base),
    };
    let headings = match scope_root {
        Some(el) => extract_headings(el),
        None => extract_headings(document.root_element()),
    };
    let images = match scope_root {
        Some(el) => extract_images(el, &base),
        None => extract_images(document.root_element(), &base),
    };
    let meta = extract_meta(&document);
    let language = document
        .select(&Selector::parse("html").unwrap())
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(str::to_string);

    Ok(PageContent {
        url: base_url.to_string(),
        title,
        text,
        links,
        headings,
        images,
        meta,
        language,
        depth: 0,
    })
}

fn extract_title(document: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").unwrap();
    if let Some(el) = document.select(&title_sel).next() {
        let text = collapse_whitespace(&el.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
    }
    meta_property(document, "og:title")
}

fn meta_property(document: &Html, property: &str) -> Option<String> {
    let meta_sel = Selector::parse("meta").unwrap();
    document.select(&meta_sel).find_map(|el| {
        let matches_prop = el.value().attr("property") == Some(property) || el.value().attr("name") == Some(property);
        if matches_prop {
            el.value().attr("content").map(|s| s.trim().to_string())
        } else {
            None
        }
    })
}

/// Visible text: whitespace runs collapse to a single space, block-level
/// elements are separated by newlines, `<script>`/`<style>` are skipped.
fn extract_text(root: ElementRef) -> String {
    let mut out = String::new();
    walk_text(root, &mut out);
    collapse_blank_lines(&out)
}

fn walk_text(el: ElementRef, out: &mut String) {
    let tag = el.value().name();
    if tag == "script" || tag == "style" || tag == "noscript" {
        return;
    }
    for child in el.children() {
        match child.value() {
            scraper::node::Node::Text(t) => {
                let collapsed = collapse_whitespace(t);
                if !collapsed.is_empty() {
                    if !out.is_empty() && !out.ends_with(['\n', ' ']) {
                        out.push(' ');
                    }
                    out.push_str(&collapsed);
                }
            }
            scraper::node::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk_text(child_el, out);
                    if BLOCK_TAGS.contains(&child_el.value().name()) {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_blank_lines(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_links(root: ElementRef, base: &url::Url) -> Vec<Link> {
    let sel = Selector::parse("a[href]").unwrap();
    root.select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.trim_start().starts_with("javascript:") {
                return None;
            }
            let rel = el.value().attr("rel").unwrap_or("");
            if rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")) {
                return None;
            }
            let resolved = base.join(href).ok()?;
            let text = collapse_whitespace(&el.text().collect::<String>());
            Some(Link {
                href: resolved.to_string(),
                text,
            })
        })
        .collect()
}

fn extract_headings(root: ElementRef) -> Vec<Heading> {
    let sel = Selector::parse("h1,h2,h3,h4,h5,h6").unwrap();
    root.select(&sel)
        .filter_map(|el| {
            let tag = el.value().name();
            let level: u8 = tag.strip_prefix('h')?.parse().ok()?;
            let text = collapse_whitespace(&el.text().collect::<String>());
            Some(Heading { level, text })
        })
        .collect()
}

fn extract_images(root: ElementRef, base: &url::Url) -> Vec<String> {
    let sel = Selector::parse("img[src]").unwrap();
    root.select(&sel)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            base.join(src).ok().map(|u| u.to_string())
        })
        .collect()
}

fn extract_meta(document: &Html) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    let sel = Selector::parse("meta").unwrap();
    for el in document.select(&sel) {
        let value = el.value();
        let key = value.attr("name").or_else(|| value.attr("property"));
        let Some(key) = key else { continue };
        let Some(content) = value.attr("content") else { continue };
        if key == "description" || key == "keywords" || key.starts_with("og:") {
            meta.insert(key.to_string(), content.to_string());
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_text_links_headings() {
        let html = r#"
            <html><head><title>Hello World</title>
            <meta name="description" content="A test page">
            </head>
            <body>
                <h1>Main Heading</h1>
                <p>Some <b>bold</b>   text.</p>
                <a href="/about" rel="nofollow">skip me</a>
                <a href="/contact">Contact</a>
            </body></html>
        "#;
        let result = extract(html, "https://example.com/page", None).unwrap();
        assert_eq!(result.title.as_deref(), Some("Hello World"));
        assert!(result.text.contains("Main Heading"));
        assert!(result.text.contains("Some bold text."));
        assert_eq!(result.headings, vec![Heading { level: 1, text: "Main Heading".to_string() }]);
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].href, "https://example.com/contact");
        assert_eq!(result.meta.get("description"), Some(&"A test page".to_string()));
    }

    #[test]
    fn selector_not_found_is_an_error() {
        let html = "<html><body><p>hi</p></body></html>";
        let err = extract(html, "https://example.com/", Some("#missing")).unwrap_err();
        assert_eq!(err.code, ErrorCode::SelectorNotFound);
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let html = "<html><body><p>hi</p></body></html>";
        let err = extract(html, "https://example.com/", Some(":::not valid:::")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSelector);
    }

    #[test]
    fn selector_scopes_extraction_to_subtree() {
        let html = r#"
            <html><body>
                <div id="main"><h2>Scoped</h2><a href="/inside">in</a></div>
                <a href="/outside">out</a>
            </body></html>
        "#;
        let result = extract(html, "https://example.com/", Some("#main")).unwrap();
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].href, "https://example.com/inside");
        assert_eq!(result.headings[0].text, "Scoped");
    }

    #[test]
    fn javascript_links_are_excluded() {
        let html = r#"<html><body><a href="javascript:void(0)">x</a><a href="/real">y</a></body></html>"#;
        let result = extract(html, "https://example.com/", None).unwrap();
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].href, "https://example.com/real");
    }
}
