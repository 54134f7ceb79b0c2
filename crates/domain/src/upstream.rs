use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Transport protocol of one upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamProto {
    /// Plain DNS over UDP with TCP retry on truncation.
    Udp,
    Tcp,
    /// DNS-over-TLS; SNI is the host part.
    Tls,
    /// DNS-over-HTTPS POST (application/dns-message).
    Https,
    /// DNS-over-QUIC.
    Quic,
}

/// One parsed upstream server spec.
///
/// Grammar: `[/domain1/domain2/]server` limits the server to the listed
/// domain suffixes; a bare `server` joins the default group; the token `#`
/// inside a reservation means "use the default group for these domains".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSpec {
    /// The server portion as written (scheme included when explicit).
    pub raw: String,
    pub proto: UpstreamProto,
    /// Host (literal IP or name) without port.
    pub host: String,
    pub port: u16,
    /// DoH path, e.g. `/dns-query`.
    pub path: Option<String>,
    /// Plain resolvers used once to resolve `host` when it is a name.
    pub bootstrap: Vec<IpAddr>,
    /// Address pinned by a DNS stamp; skips bootstrap resolution.
    pub pinned: Option<IpAddr>,
}

impl UpstreamSpec {
    pub fn host_is_ip(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// Parse the server portion of a spec (no domain reservation prefix).
    pub fn parse(server: &str) -> Result<Self, DomainError> {
        let raw = server.to_string();
        let (proto, rest) = if let Some(r) = server.strip_prefix("udp://") {
            (UpstreamProto::Udp, r)
        } else if let Some(r) = server.strip_prefix("tcp://") {
            (UpstreamProto::Tcp, r)
        } else if let Some(r) = server.strip_prefix("tls://") {
            (UpstreamProto::Tls, r)
        } else if server.starts_with("https://") {
            return Self::parse_https(server);
        } else if let Some(r) = server.strip_prefix("quic://") {
            (UpstreamProto::Quic, r)
        } else if server.starts_with("sdns://") {
            return crate::stamps::decode_stamp(server);
        } else {
            (UpstreamProto::Udp, server)
        };

        let default_port = match proto {
            UpstreamProto::Udp | UpstreamProto::Tcp => 53,
            UpstreamProto::Tls => 853,
            UpstreamProto::Quic => 853,
            UpstreamProto::Https => 443,
        };
        let (host, port) = split_host_port(rest, default_port)?;
        if host.is_empty() {
            return Err(DomainError::InvalidUpstream(format!("empty host: {server}")));
        }
        Ok(Self {
            raw,
            proto,
            host,
            port,
            path: None,
            bootstrap: Vec::new(),
            pinned: None,
        })
    }

    fn parse_https(server: &str) -> Result<Self, DomainError> {
        let rest = &server["https://".len()..];
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], rest[i..].to_string()),
            None => (rest, "/dns-query".to_string()),
        };
        let (host, port) = split_host_port(authority, 443)?;
        if host.is_empty() {
            return Err(DomainError::InvalidUpstream(format!("empty host: {server}")));
        }
        Ok(Self {
            raw: server.to_string(),
            proto: UpstreamProto::Https,
            host,
            port,
            path: Some(path),
            bootstrap: Vec::new(),
            pinned: None,
        })
    }
}

/// Split `host[:port]`, handling bracketed IPv6 literals.
fn split_host_port(s: &str, default_port: u16) -> Result<(String, u16), DomainError> {
    if let Some(rest) = s.strip_prefix('[') {
        // [v6]:port or [v6]
        let close = rest
            .find(']')
            .ok_or_else(|| DomainError::InvalidUpstream(format!("unclosed bracket: {s}")))?;
        let host = rest[..close].to_string();
        let after = &rest[close + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| DomainError::InvalidUpstream(format!("bad port: {s}")))?,
            None if after.is_empty() => default_port,
            None => {
                return Err(DomainError::InvalidUpstream(format!("trailing junk: {s}")));
            }
        };
        return Ok((host, port));
    }
    // Bare IPv6 (more than one colon) takes the default port.
    if s.matches(':').count() > 1 {
        return Ok((s.to_string(), default_port));
    }
    match s.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| DomainError::InvalidUpstream(format!("bad port: {s}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((s.to_string(), default_port)),
    }
}

/// One domain-reserved group entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReservation {
    /// Lowercased suffixes without leading dots.
    pub domains: Vec<String>,
    /// Empty means "# — use the default group".
    pub servers: Vec<UpstreamSpec>,
}

/// The full parsed upstream configuration: a default group plus per-domain
/// reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamSets {
    pub default: Vec<UpstreamSpec>,
    pub reserved: Vec<DomainReservation>,
}

impl UpstreamSets {
    /// Parse a list of upstream spec lines. Any invalid line fails the whole
    /// set, which in turn fails the config reload.
    pub fn parse(lines: &[String]) -> Result<Self, DomainError> {
        let mut sets = UpstreamSets::default();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // A lone `#` is only meaningful inside a reservation; anything
            // else starting with `#` is a comment.
            if line == "#" {
                return Err(DomainError::InvalidUpstream(
                    "`#` is only valid after a [/domain/] prefix".into(),
                ));
            }
            if line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("[/") {
                let end = rest.find("/]").ok_or_else(|| {
                    DomainError::InvalidUpstream(format!("unterminated reservation: {line}"))
                })?;
                let domains: Vec<String> = rest[..end]
                    .split('/')
                    .filter(|d| !d.is_empty())
                    .map(|d| d.trim_end_matches('.').to_ascii_lowercase())
                    .collect();
                if domains.is_empty() {
                    return Err(DomainError::InvalidUpstream(format!(
                        "reservation lists no domains: {line}"
                    )));
                }
                let server_part = rest[end + 2..].trim();
                let servers = if server_part == "#" {
                    Vec::new()
                } else if server_part.is_empty() {
                    return Err(DomainError::InvalidUpstream(format!(
                        "reservation lists no server: {line}"
                    )));
                } else {
                    vec![UpstreamSpec::parse(server_part)?]
                };
                // Merge into an existing reservation with identical domains.
                if let Some(existing) = sets
                    .reserved
                    .iter_mut()
                    .find(|r| r.domains == domains)
                {
                    existing.servers.extend(servers);
                } else {
                    sets.reserved.push(DomainReservation { domains, servers });
                }
            } else {
                sets.default.push(UpstreamSpec::parse(line)?);
            }
        }
        if sets.default.is_empty() {
            return Err(DomainError::InvalidUpstream(
                "no default upstream configured".into(),
            ));
        }
        Ok(sets)
    }

    /// Find the reservation with the most specific suffix matching `name`.
    /// Returns None when the default group should serve it.
    pub fn reservation_for(&self, name: &str) -> Option<&DomainReservation> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        let mut best: Option<(&DomainReservation, usize)> = None;
        for r in &self.reserved {
            for d in &r.domains {
                let matches = name == *d || name.ends_with(&format!(".{d}"));
                if matches {
                    let specificity = d.split('.').count();
                    if best.map_or(true, |(_, s)| specificity > s) {
                        best = Some((r, specificity));
                    }
                }
            }
        }
        best.map(|(r, _)| r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_ip_defaults_to_udp_53() {
        let u = UpstreamSpec::parse("1.1.1.1").unwrap();
        assert_eq!(u.proto, UpstreamProto::Udp);
        assert_eq!(u.host, "1.1.1.1");
        assert_eq!(u.port, 53);
    }

    #[test]
    fn test_parse_tls_default_port() {
        let u = UpstreamSpec::parse("tls://dns.example.net").unwrap();
        assert_eq!(u.proto, UpstreamProto::Tls);
        assert_eq!(u.port, 853);
    }

    #[test]
    fn test_parse_https_keeps_path() {
        let u = UpstreamSpec::parse("https://dns.example.net/dns-query").unwrap();
        assert_eq!(u.proto, UpstreamProto::Https);
        assert_eq!(u.path.as_deref(), Some("/dns-query"));
        assert_eq!(u.port, 443);
    }

    #[test]
    fn test_parse_bracketed_ipv6_with_port() {
        let u = UpstreamSpec::parse("[2606:4700:4700::1111]:5353").unwrap();
        assert_eq!(u.host, "2606:4700:4700::1111");
        assert_eq!(u.port, 5353);
    }

    #[test]
    fn test_parse_sets_with_reservation() {
        let sets = UpstreamSets::parse(&[
            "[/corp.local/]10.0.0.1".to_string(),
            "1.1.1.1".to_string(),
        ])
        .unwrap();
        assert_eq!(sets.default.len(), 1);
        assert_eq!(sets.reserved.len(), 1);
        assert_eq!(sets.reserved[0].domains, vec!["corp.local"]);
    }

    #[test]
    fn test_reservation_lookup_most_specific_wins() {
        let sets = UpstreamSets::parse(&[
            "[/example.com/]10.0.0.1".to_string(),
            "[/sub.example.com/]10.0.0.2".to_string(),
            "9.9.9.9".to_string(),
        ])
        .unwrap();
        let r = sets.reservation_for("host.sub.example.com").unwrap();
        assert_eq!(r.servers[0].host, "10.0.0.2");
        let r = sets.reservation_for("www.example.com").unwrap();
        assert_eq!(r.servers[0].host, "10.0.0.1");
        assert!(sets.reservation_for("example.org").is_none());
    }

    #[test]
    fn test_hash_token_routes_to_default() {
        let sets = UpstreamSets::parse(&[
            "[/lan/]#".to_string(),
            "1.1.1.1".to_string(),
        ])
        .unwrap();
        let r = sets.reservation_for("printer.lan").unwrap();
        assert!(r.servers.is_empty());
    }

    #[test]
    fn test_invalid_spec_fails_whole_set() {
        let err = UpstreamSets::parse(&["tls://:853".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_no_default_group_is_an_error() {
        assert!(UpstreamSets::parse(&["[/lan/]10.0.0.1".to_string()]).is_err());
    }
}
