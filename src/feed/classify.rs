//! Decides whether fetched bytes are a page that advertises feeds, or a feed.
//!
//! Both entry points are pure: no network access, no shared state.
use super::Feed;
use crate::util::clean_text;
use feed_rs::model::FeedType;
use feed_rs::parser::ParseFeedError;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// `type` attribute values of `<link>` elements that advertise a feed, in lookup order.
pub const FEED_LINK_TYPES: [&str; 4] = [
    "application/rss+xml",
    "application/atom+xml",
    "application/json",
    "application/feed+json",
];

/// Unexpected failures inside the classifier. "Not a feed" is never an error.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier fault: {0}")]
    Internal(String),
}

/// Feed metadata read from a feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFeed {
    /// Feed title, possibly empty.
    pub title: String,
    /// The document's link to itself (`rel="self"`, or JSON Feed `feed_url`).
    pub self_link: Option<String>,
}

/// An anchor whose text mentions RSS. Only a candidate until its target parses as a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspectedLink {
    /// Raw `href`, not yet resolved against the page URL.
    pub href: String,
    /// Cleaned visible text of the first anchor seen with this href.
    pub text: String,
}

/// Result of scanning a page's markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupScan {
    /// Feeds advertised by `<link>` elements in `<head>`. Links are raw hrefs.
    pub feeds: Vec<Feed>,
    /// Unique anchor targets still to be fetched and verified.
    pub suspected: Vec<SuspectedLink>,
}

impl MarkupScan {
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty() && self.suspected.is_empty()
    }
}

struct Selectors {
    title: Selector,
    head_links: Selector,
    body_anchors: Selector,
}

impl Selectors {
    fn compile() -> Result<Self, String> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| format!("{css}: {e}"));
        Ok(Self {
            title: parse("title")?,
            head_links: parse("head link[type][href]")?,
            body_anchors: parse("body a[href]")?,
        })
    }
}

fn selectors() -> Result<&'static Selectors, ClassifyError> {
    static SELECTORS: OnceLock<Result<Selectors, String>> = OnceLock::new();
    SELECTORS
        .get_or_init(Selectors::compile)
        .as_ref()
        .map_err(|e| ClassifyError::Internal(format!("selector compilation failed: {e}")))
}

/// Scans `content` as HTML for feed references.
///
/// Head `<link>` elements are collected once per entry of [`FEED_LINK_TYPES`],
/// in that order. Each one's title comes from its own `title` attribute, or
/// from the page `<title>` when the attribute is missing or blank. Elements
/// without an `href` are skipped.
///
/// Body anchors whose visible text contains "rss" (any case) are returned as
/// [`SuspectedLink`]s, one per distinct href in first-seen order. Fragment,
/// `javascript:` and `mailto:` targets are ignored.
pub fn classify_markup(content: &[u8]) -> Result<MarkupScan, ClassifyError> {
    let selectors = selectors()?;
    let html = String::from_utf8_lossy(content);
    let document = Html::parse_document(&html);

    let page_title = document
        .select(&selectors.title)
        .next()
        .map(|t| clean_text(&t.text().collect::<String>()))
        .unwrap_or_default();

    let head_links: Vec<ElementRef<'_>> = document.select(&selectors.head_links).collect();
    let mut feeds = Vec::new();
    for feed_type in FEED_LINK_TYPES {
        for link in &head_links {
            let matches_type = link
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(feed_type));
            if !matches_type {
                continue;
            }
            let Some(href) = link.attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
                continue;
            };
            let title = link
                .attr("title")
                .map(clean_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| page_title.clone());
            feeds.push(Feed::new(title, href));
        }
    }

    let mut seen = HashSet::new();
    let mut suspected = Vec::new();
    for anchor in document.select(&selectors.body_anchors) {
        let text = clean_text(&anchor.text().collect::<String>());
        if !text.to_lowercase().contains("rss") {
            continue;
        }
        let Some(href) = anchor.attr("href").map(str::trim) else {
            continue;
        };
        if !is_followable_href(href) {
            continue;
        }
        if seen.insert(href.to_owned()) {
            suspected.push(SuspectedLink {
                href: href.to_owned(),
                text,
            });
        }
    }

    Ok(MarkupScan { feeds, suspected })
}

fn is_followable_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:"))
}

#[derive(Deserialize)]
struct JsonFeedHead {
    feed_url: Option<String>,
}

/// Parses `content` as an RSS, Atom or JSON Feed document.
///
/// Returns `Ok(None)` when the bytes are simply not a feed. Only faults that
/// say nothing about the content (I/O inside the parser) are errors.
pub fn classify_feed_document(content: &[u8]) -> Result<Option<DocumentFeed>, ClassifyError> {
    let feed = match feed_rs::parser::parse(content) {
        Ok(feed) => feed,
        Err(ParseFeedError::IoError(e)) => return Err(ClassifyError::Internal(e.to_string())),
        Err(e) => {
            tracing::trace!(error = %e, "Content is not a feed document");
            return Ok(None);
        }
    };

    let title = feed
        .title
        .as_ref()
        .map(|t| clean_text(&t.content))
        .unwrap_or_default();

    let self_link = if feed.feed_type == FeedType::JSON {
        // feed-rs drops the distinction between home_page_url and feed_url
        serde_json::from_slice::<JsonFeedHead>(content)
            .ok()
            .and_then(|head| head.feed_url)
    } else {
        feed.links
            .iter()
            .find(|link| link.rel.as_deref() == Some("self"))
            .map(|link| link.href.clone())
    }
    .map(|href| href.trim().to_owned())
    .filter(|href| !href.is_empty());

    Ok(Some(DocumentFeed { title, self_link }))
}
