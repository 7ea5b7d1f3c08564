use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and the address policy that keeps
/// outbound fetches away from internal networks (SSRF).
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The input was empty after trimming.
    #[error("url is required")]
    Empty,
    /// The URL uses a scheme other than http or https.
    #[error("unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    /// The URL points to localhost.
    #[error("localhost not allowed")]
    Localhost,
    /// The host ends with a suffix the service refuses to look up.
    #[error("banned domain suffix: {0}")]
    BannedDomain(String),
}

/// Accepts only `http` and `https` URLs.
pub fn validate_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Checks the literal host of `url` against the address policy.
///
/// Only `localhost` and IP-literal hosts can be judged without a DNS lookup;
/// any other domain passes. Names that resolve to internal addresses are
/// caught later, at dial time, by the fetcher's resolver.
///
/// # Examples
///
/// ```
/// use feedfinder::util::check_host;
/// use url::Url;
///
/// let check = |raw: &str| check_host(&Url::parse(raw).unwrap());
/// assert!(check("https://example.com/feed.xml").is_ok());
/// assert!(check("http://localhost/feed").is_err());
/// assert!(check("http://10.0.0.1/feed").is_err());
/// ```
pub fn check_host(url: &Url) -> Result<(), UrlValidationError> {
    let ip = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain.eq_ignore_ascii_case("localhost")
                || domain.to_ascii_lowercase().ends_with(".localhost")
            {
                return Err(UrlValidationError::Localhost);
            }
            return Ok(());
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
    };

    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_disallowed_ip(&ip) {
        return Err(UrlValidationError::PrivateIp(ip));
    }
    Ok(())
}

/// Returns true for addresses an outbound fetch must never connect to.
///
/// Covers loopback, RFC 1918 private ranges, link-local, unspecified,
/// broadcast, IPv6 unique-local, and IPv4-mapped IPv6 forms of all of these.
pub fn is_disallowed_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_disallowed_v4(&mapped);
            }
            is_disallowed_v6(v6)
        }
    }
}

fn is_disallowed_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_disallowed_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // Unique Local (fc00::/7)
    let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
    // Link-Local (fe80::/10)
    let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
    is_unique_local || is_link_local
}

/// Turns raw user input into a discovery target.
///
/// Prepends `http://` when the input carries no `http://`/`https://` prefix,
/// then requires a parseable http(s) URL with a host that does not end in
/// any of `banned_suffixes`.
pub fn normalize_target(
    input: &str,
    banned_suffixes: &[String],
) -> Result<Url, UrlValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let lower = input.to_ascii_lowercase();
    let url = if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(input)?
    } else {
        Url::parse(&format!("http://{input}"))?
    };

    validate_scheme(&url)?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlValidationError::MissingHost)?
        .to_ascii_lowercase();

    if let Some(banned) = banned_suffixes
        .iter()
        .find(|suffix| host.ends_with(&suffix.to_ascii_lowercase()))
    {
        return Err(UrlValidationError::BannedDomain(banned.clone()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banned() -> Vec<String> {
        vec![".gov.cn".to_owned(), ".edu.cn".to_owned()]
    }

    fn host(raw: &str) -> Result<(), UrlValidationError> {
        check_host(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_public_hosts_pass() {
        assert!(host("https://example.com/feed.xml").is_ok());
        assert!(host("http://news.example.org").is_ok());
        assert!(host("https://93.184.216.34:443/feed.xml").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_scheme(&Url::parse("file:///etc/passwd").unwrap()),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_scheme(&Url::parse("ftp://example.com").unwrap()).is_err());
        assert!(validate_scheme(&Url::parse("HTTPS://example.com").unwrap()).is_ok());
    }

    #[test]
    fn test_missing_host_rejected() {
        assert!(matches!(
            host("data:text/plain,hello"),
            Err(UrlValidationError::MissingHost)
        ));
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(matches!(host("http://localhost/feed"), Err(UrlValidationError::Localhost)));
        assert!(matches!(host("http://LOCALHOST./feed"), Err(UrlValidationError::Localhost)));
        assert!(matches!(host("http://api.localhost/feed"), Err(UrlValidationError::Localhost)));
        assert!(matches!(host("http://127.0.0.1/feed"), Err(UrlValidationError::Localhost)));
        assert!(matches!(host("http://[::1]/feed"), Err(UrlValidationError::Localhost)));
    }

    #[test]
    fn test_private_ips_rejected() {
        for raw in [
            "http://192.168.1.1/feed",
            "http://10.0.0.1:3000/feed",
            "http://172.16.0.1/feed",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
            "http://[::ffff:10.0.0.1]/feed",
        ] {
            assert!(
                matches!(host(raw), Err(UrlValidationError::PrivateIp(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_ipv4_mapped_ipv6_rejected() {
        let ip: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(is_disallowed_ip(&ip));
        let ip: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert!(is_disallowed_ip(&ip));
    }

    #[test]
    fn test_public_ips_allowed() {
        for raw in ["93.184.216.34", "8.8.8.8", "2606:4700:4700::1111"] {
            let ip: IpAddr = raw.parse().unwrap();
            assert!(!is_disallowed_ip(&ip), "{raw} should be allowed");
        }
    }

    #[test]
    fn test_normalize_prepends_http() {
        let url = normalize_target("example.com/blog", &banned()).unwrap();
        assert_eq!(url.as_str(), "http://example.com/blog");
    }

    #[test]
    fn test_normalize_keeps_https() {
        let url = normalize_target("  https://example.com/  ", &banned()).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(
            normalize_target("   ", &banned()),
            Err(UrlValidationError::Empty)
        ));
    }

    #[test]
    fn test_normalize_rejects_banned_suffix() {
        let err = normalize_target("www.example.gov.cn", &banned()).unwrap_err();
        assert!(matches!(err, UrlValidationError::BannedDomain(ref s) if s == ".gov.cn"));
        assert!(normalize_target("https://lab.school.EDU.CN/x", &banned()).is_err());
    }

    #[test]
    fn test_normalize_rejects_unparsable() {
        assert!(normalize_target("http://exa mple.com", &banned()).is_err());
        assert!(normalize_target("http://", &banned()).is_err());
    }
}
