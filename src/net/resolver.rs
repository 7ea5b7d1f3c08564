use crate::util::is_disallowed_ip;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every address a hostname resolved to was inside a disallowed range.
#[derive(Debug, Error)]
#[error("{host} resolves to disallowed address {addr}")]
pub struct BlockedAddress {
    pub host: String,
    pub addr: IpAddr,
}

/// DNS resolver that only hands public addresses to the connector.
///
/// The check runs on the numeric addresses the connector will actually dial,
/// so a hostname that resolves (or later re-resolves) to an internal address
/// cannot slip past a name-based check.
///
/// Lookups go through the system resolver unless another [`Resolve`] is
/// wrapped with [`GuardedResolver::wrapping`]; its answers are filtered the
/// same way.
#[derive(Clone, Default)]
pub struct GuardedResolver {
    inner: Option<Arc<dyn Resolve>>,
}

impl GuardedResolver {
    pub fn wrapping(inner: Arc<dyn Resolve>) -> Self {
        Self { inner: Some(inner) }
    }
}

impl std::fmt::Debug for GuardedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedResolver")
            .field("system_lookup", &self.inner.is_none())
            .finish()
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_owned();
        let inner = self.inner.clone();
        Box::pin(async move {
            let resolved: Vec<SocketAddr> = match inner {
                Some(inner) => inner.resolve(name).await?.collect(),
                None => tokio::net::lookup_host((host.as_str(), 0)).await?.collect(),
            };
            let addrs = filter_addrs(&host, resolved)?;
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

/// Drops disallowed addresses, failing when nothing dialable remains.
fn filter_addrs(host: &str, resolved: Vec<SocketAddr>) -> Result<Vec<SocketAddr>, BoxError> {
    let (allowed, blocked): (Vec<_>, Vec<_>) = resolved
        .into_iter()
        .partition(|addr| !is_disallowed_ip(&addr.ip()));

    if let Some(first_blocked) = blocked.first() {
        tracing::debug!(
            host = %host,
            blocked = blocked.len(),
            allowed = allowed.len(),
            "Dropped disallowed addresses from DNS answer"
        );
        if allowed.is_empty() {
            return Err(Box::new(BlockedAddress {
                host: host.to_owned(),
                addr: first_blocked.ip(),
            }));
        }
    }

    if allowed.is_empty() {
        return Err(format!("no addresses found for {host}").into());
    }
    Ok(allowed)
}
