//! Structure analyzer (C6): page shape without body text — sections,
//! navigation, internal/external links, forms, heading outline.

use crate::error::{AppError, ErrorCode};
use crate::types::{FormInfo, Heading, Link, SectionInfo, Structure};
use scraper::{ElementRef, Html, Selector};

const SECTION_TAGS: &[&str] = &["section", "article", "aside", "header", "footer", "main", "nav"];

pub fn analyze(html: &str, base_url: &str, selector: Option<&str>) -> Result<Structure, AppError> {
    let document = Html::parse_document(html);
    let base = url::Url::parse(base_url).map_err(|e| AppError::new(ErrorCode::InvalidUrl, format!("invalid base url: {e}")))?;

    let scope_root: ElementRef = match selector {
        Some(sel) => {
            let parsed = Selector::parse(sel)
                .map_err(|e| AppError::new(ErrorCode::InvalidSelector, format!("invalid css selector '{sel}': {e:?}")))?;
            document
                .select(&parsed)
                .next()
                .ok_or_else(|| AppError::new(ErrorCode::SelectorNotFound, format!("selector '{sel}' matched no elements")))?
        }
        None => document.root_element(),
    };

    let page_host = base.host_str().map(str::to_string);

    let sections = extract_sections(scope_root);
    let navigation = extract_nav_links(scope_root, &base);
    let (internal_links, external_links) = extract_split_links(scope_root, &base, page_host.as_deref());
    let forms = extract_forms(scope_root);
    let outline = extract_outline(scope_root);

    Ok(Structure {
        url: base_url.to_string(),
        sections,
        navigation,
        internal_links,
        external_links,
        forms,
        outline,
    })
}

fn extract_sections(root: ElementRef) -> Vec<SectionInfo> {
    let selector_str = SECTION_TAGS.join(",");
    let sel = Selector::parse(&selector_str).unwrap();
    root.select(&sel)
        .map(|el| {
            let value = el.value();
            SectionInfo {
                tag: value.name().to_string(),
                id: value.attr("id").map(str::to_string),
                classes: value.classes().map(str::to_string).collect(),
                children_count: el.children().filter(|c| c.value().is_element()).count(),
            }
        })
        .collect()
}

fn extract_nav_links(root: ElementRef, base: &url::Url) -> Vec<Link> {
    let nav_sel = Selector::parse("nav").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();
    root.select(&nav_sel)
        .flat_map(|nav| {
            nav.select(&link_sel).filter_map(|el| {
                let href = el.value().attr("href")?;
                let resolved = base.join(href).ok()?;
                Some(Link {
                    href: resolved.to_string(),
                    text: el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "),
                })
            })
        })
        .collect()
}

fn extract_split_links(root: ElementRef, base: &url::Url, page_host: Option<&str>) -> (Vec<Link>, Vec<Link>) {
    let sel = Selector::parse("a[href]").unwrap();
    let mut internal = Vec::new();
    let mut external = Vec::new();
    for el in root.select(&sel) {
        let Some(href) = el.value().attr("href") else { continue };
        let Ok(resolved) = base.join(href) else { continue };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let link = Link {
            href: resolved.to_string(),
            text: el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "),
        };
        if resolved.host_str() == page_host {
            internal.push(link);
        } else {
            external.push(link);
        }
    }
    (internal, external)
}

fn extract_forms(root: ElementRef) -> Vec<FormInfo> {
    let form_sel = Selector::parse("form").unwrap();
    let field_sel = Selector::parse("input,select,textarea,button").unwrap();
    root.select(&form_sel)
        .map(|el| FormInfo {
            action: el.value().attr("action").map(str::to_string),
            method: el.value().attr("method").unwrap_or("get").to_lowercase(),
            field_count: el.select(&field_sel).count(),
        })
        .collect()
}

fn extract_outline(root: ElementRef) -> Vec<Heading> {
    let sel = Selector::parse("h1,h2,h3,h4,h5,h6").unwrap();
    root.select(&sel)
        .filter_map(|el| {
            let level: u8 = el.value().name().strip_prefix('h')?.parse().ok()?;
            Some(Heading {
                level,
                text: el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}
