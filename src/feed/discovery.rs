use super::page::scan_page;
use super::service::ServiceRegistry;
use super::wellknown::probe_well_known;
use super::{DiscoveryOptions, Feed};
use crate::config::Config;
use crate::net::{FetchError, Fetcher};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::Instrument;
use url::Url;

/// Faults that abort a discovery run.
///
/// Network failures, non-feed content and unmatched services are not errors;
/// they only mean a strategy found nothing.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A strategy task panicked or was cancelled and nothing else was found.
    #[error("discovery task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Runs the discovery strategies for a target URL.
///
/// Cheap to clone; clones share the HTTP connection pool and the service
/// registry.
#[derive(Clone)]
pub struct Finder {
    fetcher: Fetcher,
    services: Arc<ServiceRegistry>,
    options: DiscoveryOptions,
}

impl Finder {
    /// Builds a finder with the built-in service matchers.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self::with_parts(
            Fetcher::new(config)?,
            ServiceRegistry::new(),
            DiscoveryOptions::from(config),
        ))
    }

    pub fn with_parts(fetcher: Fetcher, services: ServiceRegistry, options: DiscoveryOptions) -> Self {
        Self {
            fetcher,
            services: Arc::new(services),
            options,
        }
    }

    /// Finds the feeds for `target`.
    ///
    /// Service matching goes first and ends the run when it yields anything.
    /// Otherwise the page scan and the well-known probe run side by side;
    /// the page scan's feeds win when both find some. An empty list means
    /// no strategy found a feed.
    pub async fn find(&self, target: &Url) -> Result<Vec<Feed>, DiscoveryError> {
        let span = tracing::info_span!("find", target = %target);
        async {
            let from_service = self.services.match_service(target);
            if !from_service.is_empty() {
                tracing::info!(count = from_service.len(), "Matched known service");
                return Ok(from_service);
            }

            let page = tokio::spawn({
                let this = self.clone();
                let target = target.clone();
                async move { scan_page(&this.fetcher, &target, &this.options).await }
                    .in_current_span()
            });
            let probe = tokio::spawn({
                let this = self.clone();
                let target = target.clone();
                async move { this.probe(&target).await }.in_current_span()
            });
            let (from_page, from_probe) = tokio::join!(page, probe);

            let merged = merge_branches(from_page, from_probe);
            if let Ok(feeds) = &merged {
                tracing::info!(count = feeds.len(), "Discovery finished");
            }
            merged
        }
        .instrument(span)
        .await
    }

    /// Well-known probing: first under the target's own path, then under the
    /// site root. The root pass is skipped when it would repeat the first.
    async fn probe(&self, target: &Url) -> Vec<Feed> {
        let concurrency = self.options.probe_concurrency;

        let path_base = probe_base(target);
        let feeds = probe_well_known(&self.fetcher, &path_base, concurrency).await;
        if !feeds.is_empty() {
            return feeds;
        }

        if matches!(path_base.path(), "" | "/") {
            return Vec::new();
        }
        let mut root_base = path_base;
        root_base.set_path("/");
        probe_well_known(&self.fetcher, &root_base, concurrency).await
    }
}

/// `scheme://host[:port]/path` of `target`: no credentials, query or fragment.
fn probe_base(target: &Url) -> Url {
    let mut base = target.clone();
    // Only fails for URLs that cannot carry credentials in the first place
    let _ = base.set_username("");
    let _ = base.set_password(None);
    base.set_query(None);
    base.set_fragment(None);
    base
}

/// Picks the winning branch. A failed branch counts as empty unless both
/// came back empty, in which case the failure is reported.
fn merge_branches(
    from_page: Result<Vec<Feed>, JoinError>,
    from_probe: Result<Vec<Feed>, JoinError>,
) -> Result<Vec<Feed>, DiscoveryError> {
    let mut failure = None;
    let mut settle = |branch: &str, result: Result<Vec<Feed>, JoinError>| match result {
        Ok(feeds) => feeds,
        Err(e) => {
            tracing::error!(branch, error = %e, "Discovery branch failed");
            failure.get_or_insert(e);
            Vec::new()
        }
    };
    let from_page = settle("page", from_page);
    let from_probe = settle("well-known", from_probe);

    if !from_page.is_empty() {
        return Ok(from_page);
    }
    if !from_probe.is_empty() {
        return Ok(from_probe);
    }
    match failure {
        Some(e) => Err(DiscoveryError::TaskFailed(e)),
        None => Ok(Vec::new()),
    }
}
