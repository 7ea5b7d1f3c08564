use super::resolver::{BlockedAddress, GuardedResolver};
use crate::config::Config;
use crate::util::{check_host, validate_scheme, UrlValidationError};
use futures::StreamExt;
use reqwest::dns::Resolve;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Sent with every fetch; feeds first, HTML as the fallback the page scanner understands.
const ACCEPT_FEEDS: &str = "application/rss+xml, application/atom+xml, application/feed+json, \
     application/json;q=0.9, application/xml;q=0.9, text/xml;q=0.9, text/html;q=0.8, */*;q=0.5";

/// Errors that can occur while fetching one URL.
///
/// None of these are fatal to a discovery request: the strategy step that
/// issued the fetch logs the error and reports no feeds.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or uses a scheme other than http(s)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The target (or a redirect hop) points at a disallowed address
    #[error("blocked by address policy: {0}")]
    SsrfBlocked(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The exchange did not finish within the configured timeout
    #[error("request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    TooLarge,
}

impl FetchError {
    /// Classifies a reqwest error, surfacing address-policy rejections raised
    /// inside the resolver or the redirect policy.
    fn from_reqwest(err: reqwest::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = source {
            // io::Error::source() skips the wrapped error itself, so look inside explicitly
            let inner = e
                .downcast_ref::<std::io::Error>()
                .and_then(|io| io.get_ref())
                .and_then(|inner| inner.downcast_ref::<BlockedAddress>());
            if let Some(blocked) = e.downcast_ref::<BlockedAddress>().or(inner) {
                return FetchError::SsrfBlocked(blocked.to_string());
            }
            if let Some(rejected) = e.downcast_ref::<UrlValidationError>() {
                return match rejected {
                    UrlValidationError::Localhost | UrlValidationError::PrivateIp(_) => {
                        FetchError::SsrfBlocked(rejected.to_string())
                    }
                    _ => FetchError::InvalidUrl(rejected.to_string()),
                };
            }
            source = e.source();
        }
        if err.is_timeout() {
            return FetchError::Timeout;
        }
        FetchError::Network(err)
    }
}

impl From<UrlValidationError> for FetchError {
    fn from(err: UrlValidationError) -> Self {
        match err {
            UrlValidationError::Localhost | UrlValidationError::PrivateIp(_) => {
                FetchError::SsrfBlocked(err.to_string())
            }
            other => FetchError::InvalidUrl(other.to_string()),
        }
    }
}

/// A successful (2xx) response, fully buffered.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects; relative links on the page resolve against this.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// The `Content-Type` header, lowercased, without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
    }
}

/// SSRF-hardened HTTP GET shared by every discovery strategy.
///
/// Built once from [`Config`] and cloned freely; clones share one connection
/// pool. Makes exactly one attempt per call, with no retries.
///
/// Unless `allow_private_networks` is set, connections to loopback, private,
/// link-local and unspecified addresses are refused. Literal IP hosts are
/// checked before the request and on every redirect hop, and hostnames are
/// checked after DNS resolution by [`GuardedResolver`]. Proxies are disabled
/// in guarded mode because a proxy would dial on our behalf.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    guarded: bool,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::build(config, Arc::new(GuardedResolver::default()))
    }

    /// Like [`Fetcher::new`], but guarded fetches resolve hostnames through
    /// `resolver` instead of the filtering system resolver.
    #[cfg(test)]
    pub(crate) fn with_resolver<R: Resolve + 'static>(
        config: &Config,
        resolver: Arc<R>,
    ) -> Result<Self, FetchError> {
        Self::build(config, resolver)
    }

    fn build<R: Resolve + 'static>(
        config: &Config,
        resolver: Arc<R>,
    ) -> Result<Self, FetchError> {
        let guarded = !config.allow_private_networks;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .redirect(create_redirect_policy(config.max_redirects, guarded))
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(30));

        if guarded {
            builder = builder.dns_resolver(resolver).no_proxy();
        }

        let client = builder.build().map_err(FetchError::Network)?;

        Ok(Self {
            client,
            guarded,
            timeout: config.timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Fetches `url` and buffers the body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - unparsable URL or non-http(s) scheme
    /// - [`FetchError::SsrfBlocked`] - the target or a redirect hop is a disallowed address
    /// - [`FetchError::Timeout`] - the whole exchange exceeded the timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::TooLarge`] - body exceeded the size limit
    /// - [`FetchError::Network`] - anything else reqwest reports
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let target = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        validate_scheme(&target)?;
        if self.guarded {
            check_host(&target)?;
        }

        tokio::time::timeout(self.timeout, self.fetch_inner(target))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn fetch_inner(&self, target: Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = read_limited_bytes(response, self.max_body_bytes).await?;

        Ok(FetchedPage {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Follows at most `max_hops` redirects, rejecting loops and, when guarded,
/// hops to literal internal addresses (hostnames are covered by the resolver).
fn create_redirect_policy(max_hops: usize, guarded: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_hops {
            return attempt.error(format!("too many redirects (max {max_hops})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("redirect loop detected");
        }

        if let Err(e) = validate_scheme(url) {
            return attempt.error(e);
        }
        if guarded {
            if let Err(e) = check_host(url) {
                return attempt.error(e);
            }
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len(),
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Reads the response body, giving up once it grows past `limit`.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
