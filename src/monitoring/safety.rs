//! Outbound address safety checks.
//!
//! Every address is validated right before it is probed. Results are never
//! cached because owners can edit an address between cycles.
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

use crate::config::SafetyConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Address is empty")]
    Empty,
    #[error("Malformed URL: {0}")]
    InvalidUrl(String),
    #[error("Scheme '{0}' is not allowed")]
    SchemeNotAllowed(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Host '{0}' is blocked")]
    BlockedHost(String),
    #[error("Address {0} is private, loopback, link-local or reserved")]
    RestrictedAddress(IpAddr),
    #[error("Port {0} is not allowed")]
    PortNotAllowed(u16),
    #[error("'{0}' is not a valid IP address")]
    InvalidIp(String),
}

/// Allow/deny rules applied to candidate probe addresses.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    allowed_schemes: HashSet<String>,
    allowed_ports: HashSet<u16>,
    blocked_hosts: HashSet<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

impl SafetyPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        Self {
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            allowed_ports: config.allowed_ports.iter().copied().collect(),
            blocked_hosts: config
                .blocked_hosts
                .iter()
                .map(|h| normalize_host(h))
                .collect(),
        }
    }

    /// Checks a URL and returns its normalized form.
    ///
    /// A candidate that does not start with `<scheme>://` is treated as an
    /// `https` URL. Domain names are checked by their literal value only, no
    /// DNS lookup happens here.
    pub fn validate_url(&self, candidate: &str) -> Result<Url, Rejection> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(Rejection::Empty);
        }

        let with_scheme = if has_scheme(candidate) {
            candidate.to_string()
        } else {
            format!("https://{candidate}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| match e {
            url::ParseError::EmptyHost => Rejection::MissingHost,
            other => Rejection::InvalidUrl(other.to_string()),
        })?;

        if !self.allowed_schemes.contains(url.scheme()) {
            return Err(Rejection::SchemeNotAllowed(url.scheme().to_string()));
        }

        match url.host() {
            None => return Err(Rejection::MissingHost),
            Some(Host::Domain(domain)) => {
                let name = normalize_host(domain);
                if name.is_empty() {
                    return Err(Rejection::MissingHost);
                }
                if self.blocked_hosts.contains(&name) {
                    return Err(Rejection::BlockedHost(name));
                }
            }
            Some(Host::Ipv4(v4)) => self.check_literal(IpAddr::V4(v4))?,
            Some(Host::Ipv6(v6)) => self.check_literal(IpAddr::V6(v6))?,
        }

        if let Some(port) = url.port() {
            if !self.allowed_ports.contains(&port) {
                return Err(Rejection::PortNotAllowed(port));
            }
        }

        Ok(url)
    }

    /// Checks a bare IP monitoring target. Anything that does not parse as an
    /// IP address is unsafe.
    pub fn validate_ip(&self, candidate: &str) -> Result<IpAddr, Rejection> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(Rejection::Empty);
        }
        let bare = candidate
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(candidate);
        let ip: IpAddr = bare
            .parse()
            .map_err(|_| Rejection::InvalidIp(candidate.to_string()))?;

        if is_restricted(ip) {
            return Err(Rejection::RestrictedAddress(ip));
        }
        if self.blocked_hosts.contains(&ip.to_string()) {
            return Err(Rejection::BlockedHost(ip.to_string()));
        }
        Ok(ip)
    }

    fn check_literal(&self, ip: IpAddr) -> Result<(), Rejection> {
        if self.blocked_hosts.contains(&ip.to_string()) {
            return Err(Rejection::BlockedHost(ip.to_string()));
        }
        if is_restricted(ip) {
            return Err(Rejection::RestrictedAddress(ip));
        }
        Ok(())
    }
}

/// Whether the candidate opens with an RFC 3986 scheme followed by `://`.
fn has_scheme(candidate: &str) -> bool {
    let Some((scheme, _)) = candidate.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// True for addresses that must never be probed: private, loopback,
/// link-local, unspecified, multicast, broadcast and reserved ranges.
pub fn is_restricted(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_restricted_v4(v4),
        IpAddr::V6(v6) => is_restricted_v6(v6),
    }
}

fn is_restricted_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_unspecified()
        || ip.is_loopback() // 127.0.0.0/8
        || ip.is_private() // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local() // 169.254.0.0/16
        || ip.is_broadcast()
        || ip.is_multicast()
        || octets[0] == 0 // 0.0.0.0/8
        || octets[0] >= 240 // 240.0.0.0/4
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64) // 100.64.0.0/10
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0) // 192.0.0.0/24
        || (octets[0] == 198 && (octets[1] & 0xfe) == 18) // 198.18.0.0/15
}

fn is_restricted_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_restricted_v4(v4);
    }
    let segments = ip.segments();
    ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // Reserved (::/8), which holds the IPv4-compatible form ::a.b.c.d
        || (segments[0] & 0xff00) == 0
        // Unique local (fc00::/7)
        || (segments[0] & 0xfe00) == 0xfc00
        // Link-local (fe80::/10)
        || (segments[0] & 0xffc0) == 0xfe80
        // Deprecated site-local (fec0::/10)
        || (segments[0] & 0xffc0) == 0xfec0
}
