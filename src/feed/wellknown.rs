use super::classify::classify_feed_document;
use super::Feed;
use crate::net::Fetcher;
use futures::stream::{self, StreamExt};
use url::Url;

/// Conventional feed locations, relative to a base URL, in probe order.
pub const WELL_KNOWN_SUFFIXES: [&str; 10] = [
    "atom.xml",
    "feed.xml",
    "rss.xml",
    "index.xml",
    "atom.json",
    "feed.json",
    "rss.json",
    "index.json",
    "feed/",
    "rss/",
];

/// Appends `suffix` to the path of `base` as a path join.
///
/// Query and fragment are dropped. A trailing slash on `base` does not
/// produce a double slash, and a suffix ending in `/` keeps it.
///
/// ```ignore
/// let base = Url::parse("https://example.com/blog/?page=2").unwrap();
/// assert_eq!(join_suffix(&base, "feed/").unwrap().as_str(), "https://example.com/blog/feed/");
/// ```
pub fn join_suffix(base: &Url, suffix: &str) -> Option<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(suffix.split('/'));
    Some(url)
}

/// Probes every well-known suffix under `base` and returns the ones that
/// parse as feeds, in suffix order.
///
/// Only feed documents count here; HTML at a probed path is not scanned.
/// Each feed's link is the probed URL, whatever its self link says.
pub async fn probe_well_known(fetcher: &Fetcher, base: &Url, concurrency: usize) -> Vec<Feed> {
    let candidates: Vec<Url> = WELL_KNOWN_SUFFIXES
        .iter()
        .filter_map(|suffix| join_suffix(base, suffix))
        .collect();

    let feeds: Vec<Feed> = stream::iter(candidates)
        .map(|url| async move {
            let page = match fetcher.fetch(url.as_str()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::trace!(url = %url, error = %e, "Probe missed");
                    return None;
                }
            };
            match classify_feed_document(&page.body) {
                Ok(Some(doc)) => Some(Feed::new(doc.title, url.to_string())),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Feed classification failed");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|feed| async move { feed })
        .collect()
        .await;

    tracing::debug!(base = %base, count = feeds.len(), "Well-known probe finished");
    feeds
}
