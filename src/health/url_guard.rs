//! Rejects health-check targets that point (directly or through DNS) at non-public addresses.
//!
//! Two layers: [`validate_health_check_url`] runs when a URL is stored and only inspects IP
//! literals; [`UrlGuard`] runs before every probe and resolves hostnames.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("health_check_url is not a valid URL: {0}")]
    Malformed(String),
    #[error("health_check_url must use http or https, got '{0}'")]
    UnsupportedScheme(String),
    #[error("health_check_url must include a valid hostname")]
    MissingHost,
    #[error("health_check_url must not target private or loopback addresses ({0})")]
    NonPublicAddress(IpAddr),
    #[error("health_check_url host '{0}' could not be resolved")]
    Unresolvable(String),
    #[error("health_check_url host '{host}' resolves to non-public address {addr}")]
    ResolvesToNonPublic { host: String, addr: IpAddr },
}

enum Target {
    Literal(IpAddr),
    Domain(String),
}

fn parse_target(raw: &str) -> Result<(Url, Target), UrlValidationError> {
    let url = Url::parse(raw).map_err(|e| UrlValidationError::Malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_string()));
    }
    // The url crate normalizes odd IPv4 spellings (`0x7f.1`, `2130706433`) into `Host::Ipv4`.
    let target = match url.host() {
        Some(Host::Ipv4(ip)) => Target::Literal(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => Target::Literal(IpAddr::V6(ip)),
        Some(Host::Domain(d)) if !d.trim_end_matches('.').is_empty() => {
            Target::Domain(d.to_string())
        }
        _ => return Err(UrlValidationError::MissingHost),
    };
    Ok((url, target))
}

/// Creation-time check. Hostnames pass without DNS; IP literals must be public.
pub fn validate_health_check_url(raw: &str) -> Result<(), UrlValidationError> {
    match parse_target(raw)?.1 {
        Target::Literal(ip) if !is_public_ip(ip) => Err(UrlValidationError::NonPublicAddress(ip)),
        _ => Ok(()),
    }
}

pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let reserved = ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || a == 0
        || (a == 100 && (b & 0xc0) == 64) // 100.64.0.0/10 shared address space
        || (a == 192 && b == 0 && c == 0) // 192.0.0.0/24 protocol assignments
        || (a == 198 && (b & 0xfe) == 18) // 198.18.0.0/15 benchmarking
        || a >= 240;
    !reserved
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = embedded_v4(&ip) {
        return is_public_v4(v4);
    }
    let s = ip.segments();
    let reserved = ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (s[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (s[0] & 0xffc0) == 0xfe80 // fe80::/10 link local
        || (s[0] == 0x2001 && s[1] == 0x0db8); // documentation
    !reserved
}

/// IPv4 carried inside an IPv6 address: mapped, compatible, NAT64 and 6to4 forms.
fn embedded_v4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let s = ip.segments();
    let from = |hi: u16, lo: u16| {
        Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
    };
    if s[..6].iter().all(|&x| x == 0) {
        return Some(from(s[6], s[7]));
    }
    if s[0] == 0x0064 && s[1] == 0xff9b && s[2..6].iter().all(|&x| x == 0) {
        return Some(from(s[6], s[7]));
    }
    if s[0] == 0x2002 {
        return Some(from(s[1], s[2]));
    }
    None
}

/// Name resolution seam so probes can be tested without real DNS.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Probe-time check: every address the host resolves to must be public.
#[derive(Clone)]
pub struct UrlGuard {
    resolver: Arc<dyn HostResolver>,
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl UrlGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> Arc<dyn HostResolver> {
        self.resolver.clone()
    }

    /// Returns the vetted addresses, or why the target was refused.
    pub async fn check(&self, raw: &str) -> Result<Vec<IpAddr>, UrlValidationError> {
        let (url, target) = parse_target(raw)?;
        let (host, addrs) = match target {
            Target::Literal(ip) => (ip.to_string(), vec![ip]),
            Target::Domain(domain) => {
                let port = url.port_or_known_default().unwrap_or(80);
                let addrs = self
                    .resolver
                    .resolve(&domain, port)
                    .await
                    .map_err(|_| UrlValidationError::Unresolvable(domain.clone()))?;
                (domain, addrs)
            }
        };
        if addrs.is_empty() {
            return Err(UrlValidationError::Unresolvable(host));
        }
        if let Some(&addr) = addrs.iter().find(|a| !is_public_ip(**a)) {
            return Err(UrlValidationError::ResolvesToNonPublic { host, addr });
        }
        Ok(addrs)
    }

    pub async fn is_url_safe(&self, raw: &str) -> bool {
        match self.check(raw).await {
            Ok(_) => true,
            Err(e) => {
                warn!(target: "security", url = raw, reason = %e, "Blocked health check target.");
                false
            }
        }
    }
}

/// `reqwest` resolver that drops non-public answers, so a name that re-resolves to an internal
/// address between the guard check and the connect still cannot be reached.
pub struct PublicOnlyResolver {
    inner: Arc<dyn HostResolver>,
}

impl PublicOnlyResolver {
    pub fn new(inner: Arc<dyn HostResolver>) -> Self {
        Self { inner }
    }
}

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let inner = self.inner.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            let public: Vec<SocketAddr> = inner
                .resolve(&host, 0)
                .await?
                .into_iter()
                .filter(|ip| is_public_ip(*ip))
                .map(|ip| SocketAddr::new(ip, 0))
                .collect();
            if public.is_empty() {
                return Err(format!("{host} has no public address").into());
            }
            let addrs: Addrs = Box::new(public.into_iter());
            Ok(addrs)
        })
    }
}
