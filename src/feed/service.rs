//! Feed links for well-known platforms, derived from the URL alone.
use super::Feed;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// A platform rule that turns a URL into feed links without fetching anything.
pub trait ServiceMatcher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Feeds for `url`, or an empty list when the URL is not for this platform.
    fn match_url(&self, url: &Url) -> Result<Vec<Feed>, ServiceError>;
}

/// Ordered matchers; the first non-empty answer wins.
pub struct ServiceRegistry {
    matchers: Vec<Box<dyn ServiceMatcher>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            matchers: Vec::new(),
        };
        registry.register(Box::new(GitHubMatcher));
        registry.register(Box::new(RedditMatcher));
        registry
    }

    pub fn register(&mut self, matcher: Box<dyn ServiceMatcher>) {
        self.matchers.push(matcher);
    }

    /// Runs matchers in order. A matcher that fails is logged and skipped.
    pub fn match_service(&self, url: &Url) -> Vec<Feed> {
        for matcher in &self.matchers {
            match matcher.match_url(url) {
                Ok(feeds) if !feeds.is_empty() => {
                    tracing::debug!(service = matcher.name(), count = feeds.len(), "Service matched");
                    return feeds;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(service = matcher.name(), error = %e, "Service matcher failed, skipping");
                }
            }
        }
        Vec::new()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `host` is `domain` or one of its subdomains.
///
/// A plain suffix test would also accept lookalike registrations such as
/// `notgithub.com`; those are not the platform and get no feeds.
fn host_matches(url: &Url, domain: &str) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn compiled(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, ServiceError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| ServiceError::Pattern(e.clone()))
}

// ============================================================================
// GitHub
// ============================================================================

/// https://docs.github.com/en/rest/activity/feeds
///
/// Matches `github.com` and its subdomains only, not every host ending in
/// `github.com`.
pub struct GitHubMatcher;

const GITHUB_USER_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9-]{0,38}$";
const GITHUB_REPO_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]{0,98}[A-Za-z0-9]$";

impl GitHubMatcher {
    pub fn global_feeds() -> Vec<Feed> {
        vec![
            Feed::new("global public timeline", "https://github.com/timeline"),
            Feed::new(
                "global security advisories",
                "https://github.com/security-advisories.atom",
            ),
        ]
    }

    pub fn user_feeds(user: &str) -> Vec<Feed> {
        vec![Feed::new(
            format!("{user} public timeline"),
            format!("https://github.com/{user}.atom"),
        )]
    }

    pub fn repo_feeds(user: &str, repo: &str) -> Vec<Feed> {
        ["commits", "releases", "tags", "wiki"]
            .into_iter()
            .map(|facet| {
                Feed::new(
                    format!("{user}/{repo} {facet}"),
                    format!("https://github.com/{user}/{repo}/{facet}.atom"),
                )
            })
            .collect()
    }
}

impl ServiceMatcher for GitHubMatcher {
    fn name(&self) -> &'static str {
        "github"
    }

    fn match_url(&self, url: &Url) -> Result<Vec<Feed>, ServiceError> {
        static USER_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
        static REPO_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

        if !host_matches(url, "github.com") {
            return Ok(Vec::new());
        }

        let mut feeds = Self::global_feeds();
        let segments = path_segments(url);

        let Some(user) = segments.first().copied() else {
            return Ok(feeds);
        };
        if !compiled(&USER_RE, GITHUB_USER_PATTERN)?.is_match(user) {
            return Ok(feeds);
        }
        feeds.extend(Self::user_feeds(user));

        let Some(repo) = segments.get(1).copied() else {
            return Ok(feeds);
        };
        if compiled(&REPO_RE, GITHUB_REPO_PATTERN)?.is_match(repo) {
            feeds.extend(Self::repo_feeds(user, repo));
        }
        Ok(feeds)
    }
}

// ============================================================================
// Reddit
// ============================================================================

/// https://www.reddit.com/wiki/rss/
///
/// Matches `reddit.com` and its subdomains only, not every host ending in
/// `reddit.com`.
pub struct RedditMatcher;

impl RedditMatcher {
    pub fn global_feeds() -> Vec<Feed> {
        vec![Feed::new("global", "https://www.reddit.com/.rss")]
    }

    pub fn subreddit_feeds(sub: &str) -> Vec<Feed> {
        ["hot", "new", "top", "rising"]
            .into_iter()
            .map(|sort| {
                Feed::new(
                    format!("/r/{sub} {sort}"),
                    format!("https://reddit.com/r/{sub}/{sort}/.rss"),
                )
            })
            .collect()
    }

    /// The thread URL itself, minus query and fragment, with `.rss` appended.
    pub fn thread_feeds(url: &Url) -> Vec<Feed> {
        let mut thread = url.clone();
        thread.set_query(None);
        thread.set_fragment(None);
        vec![Feed::new("post", format!("{thread}.rss"))]
    }

    pub fn user_feeds(user: &str) -> Vec<Feed> {
        let mut feeds = Vec::with_capacity(10);
        for (label, listing) in [("overview", ""), ("post", "submitted/"), ("comments", "comments/")] {
            for sort in ["new", "hot", "top"] {
                feeds.push(Feed::new(
                    format!("/u/{user} {label} {sort}"),
                    format!("https://reddit.com/user/{user}/{listing}.rss?sort={sort}"),
                ));
            }
        }
        feeds.push(Feed::new(
            format!("/u/{user} awards received (legacy)"),
            format!("https://old.reddit.com/user/{user}/gilded/.rss"),
        ));
        feeds
    }

    pub fn domain_feeds(domain: &str) -> Vec<Feed> {
        vec![Feed::new(
            format!("/domain/{domain}"),
            format!("https://reddit.com/domain/{domain}/.rss"),
        )]
    }
}

impl ServiceMatcher for RedditMatcher {
    fn name(&self) -> &'static str {
        "reddit"
    }

    fn match_url(&self, url: &Url) -> Result<Vec<Feed>, ServiceError> {
        if !host_matches(url, "reddit.com") {
            return Ok(Vec::new());
        }

        let segments = path_segments(url);
        let Some(mode) = segments.first().copied() else {
            return Ok(Self::global_feeds());
        };
        let Some(param) = segments.get(1).copied() else {
            return Ok(Vec::new());
        };

        let feeds = match mode {
            "r" => {
                let is_thread = segments
                    .get(2)
                    .is_some_and(|next| next.starts_with("comments"));
                if is_thread {
                    Self::thread_feeds(url)
                } else {
                    Self::subreddit_feeds(param)
                }
            }
            "user" | "u" => Self::user_feeds(param),
            "domain" => Self::domain_feeds(param),
            _ => Vec::new(),
        };
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn github(raw: &str) -> Vec<Feed> {
        GitHubMatcher.match_url(&url(raw)).unwrap()
    }

    fn reddit(raw: &str) -> Vec<Feed> {
        RedditMatcher.match_url(&url(raw)).unwrap()
    }

    // --- GitHub ---

    #[test]
    fn test_github_root_gives_global_feeds() {
        assert_eq!(github("https://github.com"), GitHubMatcher::global_feeds());
        assert_eq!(github("https://github.com/"), GitHubMatcher::global_feeds());
    }

    #[test]
    fn test_github_user() {
        let mut want = GitHubMatcher::global_feeds();
        want.push(Feed::new("user public timeline", "https://github.com/user.atom"));
        assert_eq!(github("https://github.com/user"), want);
        assert_eq!(github("https://github.com/user/"), want);
    }

    #[test]
    fn test_github_repo() {
        let feeds = github("https://github.com/user/repo");
        let links: Vec<&str> = feeds.iter().map(|f| f.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://github.com/timeline",
                "https://github.com/security-advisories.atom",
                "https://github.com/user.atom",
                "https://github.com/user/repo/commits.atom",
                "https://github.com/user/repo/releases.atom",
                "https://github.com/user/repo/tags.atom",
                "https://github.com/user/repo/wiki.atom",
            ]
        );
        assert_eq!(feeds[3].title, "user/repo commits");
    }

    #[test]
    fn test_github_deep_path_uses_first_two_segments() {
        let feeds = github("https://github.com/rust-lang/rust/issues/1?x=1");
        assert_eq!(feeds.len(), 7);
        assert_eq!(feeds[6].link, "https://github.com/rust-lang/rust/wiki.atom");
    }

    #[test]
    fn test_github_invalid_user_falls_back_to_global() {
        assert_eq!(github("https://github.com/-bad"), GitHubMatcher::global_feeds());
        let too_long = "a".repeat(40);
        assert_eq!(
            github(&format!("https://github.com/{too_long}/repo")),
            GitHubMatcher::global_feeds()
        );
    }

    #[test]
    fn test_github_invalid_repo_keeps_user_feed() {
        let feeds = github("https://github.com/user/bad.");
        assert_eq!(feeds.len(), 3);
        assert_eq!(feeds[2].link, "https://github.com/user.atom");
    }

    #[test]
    fn test_github_subdomain_matches_but_lookalike_does_not() {
        assert!(!github("https://www.github.com/user").is_empty());
        assert!(github("https://notgithub.com/user").is_empty());
        assert!(github("https://example.com/user").is_empty());
    }

    // --- Reddit ---

    #[test]
    fn test_reddit_root_gives_global_feed() {
        assert_eq!(reddit("https://www.reddit.com/"), RedditMatcher::global_feeds());
    }

    #[test]
    fn test_reddit_subreddit() {
        let feeds = reddit("https://reddit.com/r/rust");
        assert_eq!(
            feeds,
            vec![
                Feed::new("/r/rust hot", "https://reddit.com/r/rust/hot/.rss"),
                Feed::new("/r/rust new", "https://reddit.com/r/rust/new/.rss"),
                Feed::new("/r/rust top", "https://reddit.com/r/rust/top/.rss"),
                Feed::new("/r/rust rising", "https://reddit.com/r/rust/rising/.rss"),
            ]
        );
    }

    #[test]
    fn test_reddit_comment_thread() {
        let raw = "https://www.reddit.com/r/rust/comments/abc123/some_title/";
        assert_eq!(
            reddit(raw),
            vec![Feed::new("post", format!("{raw}.rss"))]
        );
    }

    #[test]
    fn test_reddit_thread_drops_query() {
        let feeds = reddit("https://www.reddit.com/r/rust/comments/abc123/t/?utm=x");
        assert_eq!(
            feeds[0].link,
            "https://www.reddit.com/r/rust/comments/abc123/t/.rss"
        );
    }

    #[test]
    fn test_reddit_user() {
        let feeds = reddit("https://www.reddit.com/user/spez");
        assert_eq!(feeds.len(), 10);
        assert_eq!(feeds[0].link, "https://reddit.com/user/spez/.rss?sort=new");
        assert_eq!(
            feeds[3].link,
            "https://reddit.com/user/spez/submitted/.rss?sort=new"
        );
        assert_eq!(
            feeds[8].link,
            "https://reddit.com/user/spez/comments/.rss?sort=top"
        );
        assert_eq!(
            feeds[9],
            Feed::new(
                "/u/spez awards received (legacy)",
                "https://old.reddit.com/user/spez/gilded/.rss"
            )
        );
        assert_eq!(reddit("https://www.reddit.com/u/spez"), feeds);
    }

    #[test]
    fn test_reddit_lookalike_host_does_not_match() {
        assert!(reddit("https://notreddit.com/r/rust").is_empty());
        assert!(!reddit("https://old.reddit.com/r/rust").is_empty());
    }

    #[test]
    fn test_reddit_domain() {
        assert_eq!(
            reddit("https://reddit.com/domain/example.com"),
            vec![Feed::new(
                "/domain/example.com",
                "https://reddit.com/domain/example.com/.rss"
            )]
        );
    }

    #[test]
    fn test_reddit_unknown_mode_or_missing_param() {
        assert!(reddit("https://reddit.com/settings/account").is_empty());
        assert!(reddit("https://reddit.com/r").is_empty());
    }

    // --- Registry ---

    struct Failing;

    impl ServiceMatcher for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn match_url(&self, _url: &Url) -> Result<Vec<Feed>, ServiceError> {
            Err(ServiceError::Pattern(Regex::new("(").unwrap_err()))
        }
    }

    #[test]
    fn test_registry_first_match_wins() {
        let registry = ServiceRegistry::new();
        let feeds = registry.match_service(&url("https://github.com/user"));
        assert_eq!(feeds.len(), 3);
        assert!(registry.match_service(&url("https://example.com/")).is_empty());
    }

    #[test]
    fn test_registry_skips_failing_matcher() {
        let mut registry = ServiceRegistry {
            matchers: vec![Box::new(Failing)],
        };
        registry.register(Box::new(RedditMatcher));
        let feeds = registry.match_service(&url("https://reddit.com/r/rust"));
        assert_eq!(feeds.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_github_repo_urls_yield_fixed_templates(
            user in "[A-Za-z0-9][A-Za-z0-9-]{0,38}",
            repo in "[A-Za-z0-9][A-Za-z0-9._-]{0,98}[A-Za-z0-9]",
        ) {
            let feeds = github(&format!("https://github.com/{user}/{repo}"));
            let mut want = GitHubMatcher::global_feeds();
            want.extend(GitHubMatcher::user_feeds(&user));
            want.extend(GitHubMatcher::repo_feeds(&user, &repo));
            prop_assert_eq!(feeds, want);
        }

        #[test]
        fn prop_subreddit_urls_yield_four_sort_feeds(sub in "[A-Za-z0-9_]{1,21}") {
            let feeds = reddit(&format!("https://reddit.com/r/{sub}"));
            prop_assert_eq!(feeds, RedditMatcher::subreddit_feeds(&sub));
        }

        #[test]
        fn prop_comment_thread_appends_rss(
            sub in "[A-Za-z0-9_]{1,21}",
            id in "[a-z0-9]{5,8}",
            slug in "[a-z0-9_]{1,30}",
        ) {
            let raw = format!("https://www.reddit.com/r/{sub}/comments/{id}/{slug}/");
            let feeds = reddit(&raw);
            prop_assert_eq!(feeds, vec![Feed::new("post", format!("{raw}.rss"))]);
        }
    }
}
