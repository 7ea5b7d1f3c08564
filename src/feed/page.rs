use super::classify::{classify_feed_document, classify_markup, SuspectedLink};
use super::{DiscoveryOptions, Feed};
use crate::net::Fetcher;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use url::Url;

/// Fetches `url` once and reports the feeds it advertises or is.
///
/// Markup wins: if the page links to feeds (head `<link>` elements, or body
/// anchors that verify as feeds), those are returned with links made
/// absolute against the final response URL. Only when the markup yields
/// nothing is the body itself parsed as a feed, in which case the feed's
/// self link is used, falling back to `url`.
///
/// Fetch failures, non-2xx responses and unparsable bodies all produce an
/// empty list.
pub async fn scan_page(fetcher: &Fetcher, url: &Url, options: &DiscoveryOptions) -> Vec<Feed> {
    let page = match fetcher.fetch(url.as_str()).await {
        Ok(page) => page,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Page fetch failed");
            return Vec::new();
        }
    };

    match classify_markup(&page.body) {
        Ok(scan) => {
            let mut feeds: Vec<Feed> = scan
                .feeds
                .into_iter()
                .filter_map(|feed| {
                    let link = resolve_link(&page.url, &feed.link)?;
                    Some(Feed::new(feed.title, link))
                })
                .collect();

            let mut suspected = scan.suspected;
            suspected.truncate(options.max_suspected_links);
            feeds.extend(verify_suspected(fetcher, &page.url, suspected, options.verify_concurrency).await);

            if !feeds.is_empty() {
                tracing::debug!(url = %url, count = feeds.len(), "Feeds found in page markup");
                return feeds;
            }
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Markup classification failed");
        }
    }

    match classify_feed_document(&page.body) {
        Ok(Some(doc)) => {
            let link = doc
                .self_link
                .and_then(|href| resolve_link(&page.url, &href))
                .unwrap_or_else(|| url.to_string());
            tracing::debug!(url = %url, content_type = ?page.content_type(), "Page is itself a feed");
            vec![Feed::new(doc.title, link)]
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Feed classification failed");
            Vec::new()
        }
    }
}

/// Fetches each suspected anchor target and keeps those that parse as feeds.
///
/// Targets are resolved against `base` and deduplicated by resolved URL
/// before any fetch. Up to `concurrency` fetches run at once; results keep
/// the anchors' document order.
pub async fn verify_suspected(
    fetcher: &Fetcher,
    base: &Url,
    suspected: Vec<SuspectedLink>,
    concurrency: usize,
) -> Vec<Feed> {
    let mut seen = HashSet::new();
    let candidates: Vec<(String, String)> = suspected
        .into_iter()
        .filter_map(|s| {
            let link = resolve_link(base, &s.href)?;
            seen.insert(link.clone()).then_some((link, s.text))
        })
        .collect();

    if candidates.is_empty() {
        return Vec::new();
    }

    stream::iter(candidates)
        .map(|(link, text)| async move {
            let page = match fetcher.fetch(&link).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(url = %link, error = %e, "Suspected feed fetch failed");
                    return None;
                }
            };
            match classify_feed_document(&page.body) {
                Ok(Some(doc)) => {
                    let title = if doc.title.is_empty() { text } else { doc.title };
                    Some(Feed::new(title, link))
                }
                Ok(None) => {
                    tracing::debug!(url = %link, "Suspected link is not a feed");
                    None
                }
                Err(e) => {
                    tracing::warn!(url = %link, error = %e, "Feed classification failed");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|feed| async move { feed })
        .collect()
        .await
}

/// Makes `href` absolute against `base`.
///
/// Hrefs that already parse as absolute URLs are returned untouched.
/// Protocol-relative and path-relative hrefs follow standard URL reference
/// resolution. Returns `None` when the href cannot be resolved.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if Url::parse(href).is_ok() {
        return Some(href.to_owned());
    }
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example Blog</title>
  <link>https://example.com</link>
</channel></rss>"#;

    fn fetcher() -> Fetcher {
        let config = Config {
            allow_private_networks: true,
            ..Config::default()
        };
        Fetcher::new(&config).unwrap()
    }

    fn base(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    async fn mount(server: &MockServer, at: &str, body: &str, content_type: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", content_type),
            )
            .mount(server)
            .await;
    }

    // --- resolve_link ---

    #[test]
    fn test_resolve_root_relative() {
        assert_eq!(
            resolve_link(&base("https://x.xx/1/"), "/x/index.xml").as_deref(),
            Some("https://x.xx/x/index.xml")
        );
    }

    #[test]
    fn test_resolve_path_relative_under_directory() {
        assert_eq!(
            resolve_link(&base("https://x.xx/1/"), "x/index.xml").as_deref(),
            Some("https://x.xx/1/x/index.xml")
        );
    }

    #[test]
    fn test_resolve_path_relative_replaces_last_segment() {
        assert_eq!(
            resolve_link(&base("https://x.xx/1"), "index.xml").as_deref(),
            Some("https://x.xx/index.xml")
        );
    }

    #[test]
    fn test_resolve_protocol_relative() {
        assert_eq!(
            resolve_link(&base("https://example.com/a"), "//cdn.example.com/feed").as_deref(),
            Some("https://cdn.example.com/feed")
        );
    }

    #[test]
    fn test_resolve_absolute_untouched() {
        assert_eq!(
            resolve_link(&base("https://example.com/"), "HTTPS://Feeds.Example.com/rss").as_deref(),
            Some("HTTPS://Feeds.Example.com/rss")
        );
    }

    #[test]
    fn test_resolve_empty_is_none() {
        assert_eq!(resolve_link(&base("https://example.com/"), "  "), None);
    }

    // --- scan_page ---

    #[tokio::test]
    async fn test_markup_links_resolved_against_final_url() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/blog/",
            r#"<html><head><title>Blog</title>
                <link rel="alternate" type="application/rss+xml" href="feed.xml">
                <link rel="alternate" type="application/atom+xml" title="Atom" href="/atom.xml">
            </head><body></body></html>"#,
            "text/html",
        )
        .await;

        let url = base(&format!("{}/blog/", server.uri()));
        let feeds = scan_page(&fetcher(), &url, &DiscoveryOptions::default()).await;
        assert_eq!(
            feeds,
            vec![
                Feed::new("Blog", format!("{}/blog/feed.xml", server.uri())),
                Feed::new("Atom", format!("{}/atom.xml", server.uri())),
            ]
        );
    }

    #[tokio::test]
    async fn test_page_that_is_a_feed_uses_fetch_url() {
        let server = MockServer::start().await;
        mount(&server, "/rss", RSS, "text/plain").await;

        let url = base(&format!("{}/rss", server.uri()));
        let feeds = scan_page(&fetcher(), &url, &DiscoveryOptions::default()).await;
        assert_eq!(feeds, vec![Feed::new("Example Blog", url.to_string())]);
    }

    #[tokio::test]
    async fn test_non_success_page_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string(RSS))
            .mount(&server)
            .await;

        let url = base(&server.uri());
        assert!(scan_page(&fetcher(), &url, &DiscoveryOptions::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_suspected_anchor_verified_by_fetching() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/",
            r#"<html><head><title>Home</title></head><body>
                <a href="/releases.atom">Release notes RSS</a>
                <a href="/about">Read more about our RSS feed</a>
                <a href="/releases.atom">RSS again</a>
            </body></html>"#,
            "text/html",
        )
        .await;
        mount(&server, "/releases.atom", RSS, "application/rss+xml").await;
        mount(&server, "/about", "<html><body>about</body></html>", "text/html").await;

        let url = base(&format!("{}/", server.uri()));
        let feeds = scan_page(&fetcher(), &url, &DiscoveryOptions::default()).await;
        assert_eq!(
            feeds,
            vec![Feed::new(
                "Example Blog",
                format!("{}/releases.atom", server.uri())
            )]
        );
    }

    #[tokio::test]
    async fn test_verify_deduplicates_by_resolved_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&server)
            .await;

        let page_url = base(&format!("{}/blog/", server.uri()));
        let suspected = vec![
            SuspectedLink {
                href: "/feed".into(),
                text: "RSS".into(),
            },
            SuspectedLink {
                href: format!("{}/feed", server.uri()),
                text: "RSS feed".into(),
            },
        ];
        let feeds = verify_suspected(&fetcher(), &page_url, suspected, 4).await;
        assert_eq!(feeds.len(), 1);
    }

    #[tokio::test]
    async fn test_verified_feed_without_title_uses_anchor_text() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/untitled.xml",
            r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#,
            "application/xml",
        )
        .await;

        let page_url = base(&server.uri());
        let suspected = vec![SuspectedLink {
            href: "/untitled.xml".into(),
            text: "Site RSS".into(),
        }];
        let feeds = verify_suspected(&fetcher(), &page_url, suspected, 1).await;
        assert_eq!(
            feeds,
            vec![Feed::new("Site RSS", format!("{}/untitled.xml", server.uri()))]
        );
    }
}
