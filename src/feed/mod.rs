//! Feed discovery.
//!
//! Given a target URL, discovery runs up to three strategies and reports the
//! feeds found by the first one that produces anything:
//!
//! 1. **Known services** ([`service`]) - URL-pattern rules for sites whose
//!    feeds can be derived without any network access (GitHub, Reddit)
//! 2. **Page scan** ([`page`]) - fetch the target once, read `<link>`
//!    elements and RSS-mentioning anchors, or accept the body as a feed
//! 3. **Well-known paths** ([`wellknown`]) - probe conventional feed
//!    locations under the target's path, then under the site root
//!
//! Strategies 2 and 3 run concurrently; the page scan takes precedence.
//! [`classify`] holds the pure content classifiers both of them share.
//!
//! # Example
//!
//! ```ignore
//! use feedfinder::{config::Config, feed::Finder};
//!
//! let finder = Finder::new(&Config::default())?;
//! let target = url::Url::parse("https://blog.example.com/")?;
//! for feed in finder.find(&target).await? {
//!     println!("{} <{}>", feed.title, feed.link);
//! }
//! ```

pub mod classify;
mod discovery;
mod page;
pub mod service;
mod wellknown;

use crate::config::Config;
use serde::{Deserialize, Serialize};

pub use discovery::{DiscoveryError, Finder};
pub use page::{resolve_link, scan_page, verify_suspected};
pub use service::{ServiceMatcher, ServiceRegistry};
pub use wellknown::{join_suffix, probe_well_known, WELL_KNOWN_SUFFIXES};

/// A discovered feed.
///
/// `link` is always a non-empty absolute URL; `title` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub link: String,
}

impl Feed {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

/// Fan-out limits for the network strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Well-known paths probed at once.
    pub probe_concurrency: usize,
    /// Suspected anchor targets fetched at once.
    pub verify_concurrency: usize,
    /// Suspected anchors considered per page; the rest are dropped.
    pub max_suspected_links: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DiscoveryOptions {
    fn from(config: &Config) -> Self {
        Self {
            probe_concurrency: config.probe_concurrency,
            verify_concurrency: config.verify_concurrency,
            max_suspected_links: config.max_suspected_links,
        }
    }
}
