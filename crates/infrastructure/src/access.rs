use arc_swap::ArcSwap;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;
use warden_dns_domain::config::AccessConfig;

/// One allow/deny client entry.
#[derive(Debug, Clone)]
enum ClientRule {
    Ip(IpAddr),
    Net(IpNetwork),
    /// ClientID or hostname glob (`*` wildcards).
    Pattern(String),
}

impl ClientRule {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        if let Ok(ip) = entry.parse::<IpAddr>() {
            return Some(Self::Ip(ip));
        }
        if let Ok(net) = entry.parse::<IpNetwork>() {
            return Some(Self::Net(net));
        }
        Some(Self::Pattern(entry.to_ascii_lowercase()))
    }

    fn matches(&self, ip: IpAddr, client_id: Option<&str>) -> bool {
        match self {
            Self::Ip(rule_ip) => *rule_ip == ip,
            Self::Net(net) => net.contains(ip),
            Self::Pattern(pattern) => client_id
                .map(|id| glob_match(pattern, &id.to_ascii_lowercase()))
                .unwrap_or(false),
        }
    }
}

/// Blocked-host entry: exact name, bare suffix, or `*.x` wildcard.
#[derive(Debug, Clone)]
enum HostRule {
    Exact(String),
    /// `*.x`: subdomains only.
    Wildcard(String),
    /// Glob with interior `*`.
    Glob(String),
}

impl HostRule {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim().trim_end_matches('.').to_ascii_lowercase();
        if entry.is_empty() {
            return None;
        }
        if let Some(suffix) = entry.strip_prefix("*.") {
            if !suffix.contains('*') {
                return Some(Self::Wildcard(suffix.to_string()));
            }
        }
        if entry.contains('*') {
            return Some(Self::Glob(entry));
        }
        Some(Self::Exact(entry))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(host) => {
                name == host
                    || (name.len() > host.len()
                        && name.ends_with(host.as_str())
                        && name.as_bytes()[name.len() - host.len() - 1] == b'.')
            }
            Self::Wildcard(suffix) => {
                name.len() > suffix.len()
                    && name.ends_with(suffix.as_str())
                    && name.as_bytes()[name.len() - suffix.len() - 1] == b'.'
            }
            Self::Glob(pattern) => glob_match(pattern, name),
        }
    }
}

/// `*`-only glob, no character classes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == parts.len() - 1 {
            return text.len() >= pos + part.len() && text.ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    // Pattern ended with `*`.
    true
}

/// Verdict of the access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    Allow,
    /// Client not permitted: respond REFUSED.
    RefuseClient,
    /// Queried name on the blocked-hosts list: respond per blocking mode.
    BlockHost,
}

struct AccessSnapshot {
    allowed: Vec<ClientRule>,
    disallowed: Vec<ClientRule>,
    blocked_hosts: Vec<HostRule>,
}

/// Allow/deny by client and by queried name. Immutable snapshot per reload,
/// readers lock-free after the pointer load.
pub struct AccessControl {
    snapshot: ArcSwap<AccessSnapshot>,
}

impl AccessControl {
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Self::compile(config)),
        }
    }

    pub fn reload(&self, config: &AccessConfig) {
        self.snapshot.store(Arc::new(Self::compile(config)));
    }

    fn compile(config: &AccessConfig) -> AccessSnapshot {
        let parse_clients = |entries: &[String]| {
            entries
                .iter()
                .filter_map(|e| {
                    let rule = ClientRule::parse(e);
                    if rule.is_none() && !e.trim().is_empty() {
                        warn!(entry = %e, "Unparseable access-list client entry");
                    }
                    rule
                })
                .collect::<Vec<_>>()
        };
        AccessSnapshot {
            allowed: parse_clients(&config.allowed_clients),
            disallowed: parse_clients(&config.disallowed_clients),
            blocked_hosts: config
                .blocked_hosts
                .iter()
                .filter_map(|e| HostRule::parse(e))
                .collect(),
        }
    }

    pub fn check(&self, ip: IpAddr, client_id: Option<&str>, name: &str) -> AccessVerdict {
        let snapshot = self.snapshot.load();

        if !snapshot.allowed.is_empty()
            && !snapshot.allowed.iter().any(|r| r.matches(ip, client_id))
        {
            return AccessVerdict::RefuseClient;
        }

        if snapshot.disallowed.iter().any(|r| r.matches(ip, client_id)) {
            return AccessVerdict::RefuseClient;
        }

        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if snapshot.blocked_hosts.iter().any(|r| r.matches(&name)) {
            return AccessVerdict::BlockHost;
        }

        AccessVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(allowed: &[&str], disallowed: &[&str], hosts: &[&str]) -> AccessControl {
        AccessControl::new(&AccessConfig {
            allowed_clients: allowed.iter().map(|s| s.to_string()).collect(),
            disallowed_clients: disallowed.iter().map(|s| s.to_string()).collect(),
            blocked_hosts: hosts.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_lists_allow_everyone() {
        let a = access(&[], &[], &[]);
        assert_eq!(a.check(ip("192.0.2.1"), None, "example.com"), AccessVerdict::Allow);
    }

    #[test]
    fn test_allowlist_excludes_unlisted() {
        let a = access(&["10.0.0.0/8"], &[], &[]);
        assert_eq!(a.check(ip("10.1.2.3"), None, "x.com"), AccessVerdict::Allow);
        assert_eq!(a.check(ip("192.0.2.1"), None, "x.com"), AccessVerdict::RefuseClient);
    }

    #[test]
    fn test_disallow_blocks_even_when_allowed() {
        let a = access(&["10.0.0.0/8"], &["10.1.2.3"], &[]);
        assert_eq!(a.check(ip("10.1.2.3"), None, "x.com"), AccessVerdict::RefuseClient);
    }

    #[test]
    fn test_client_id_pattern() {
        let a = access(&[], &["kids-*"], &[]);
        assert_eq!(
            a.check(ip("192.0.2.1"), Some("kids-tablet"), "x.com"),
            AccessVerdict::RefuseClient
        );
        assert_eq!(a.check(ip("192.0.2.1"), Some("adult"), "x.com"), AccessVerdict::Allow);
    }

    #[test]
    fn test_blocked_host_exact_and_suffix() {
        let a = access(&[], &[], &["bad.example"]);
        assert_eq!(a.check(ip("192.0.2.1"), None, "bad.example"), AccessVerdict::BlockHost);
        assert_eq!(a.check(ip("192.0.2.1"), None, "sub.bad.example"), AccessVerdict::BlockHost);
        assert_eq!(a.check(ip("192.0.2.1"), None, "good.example"), AccessVerdict::Allow);
    }

    #[test]
    fn test_blocked_host_wildcard_excludes_apex() {
        let a = access(&[], &[], &["*.ads.example"]);
        assert_eq!(a.check(ip("192.0.2.1"), None, "x.ads.example"), AccessVerdict::BlockHost);
        assert_eq!(a.check(ip("192.0.2.1"), None, "ads.example"), AccessVerdict::Allow);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("kids-*", "kids-tablet"));
        assert!(glob_match("*-tablet", "kids-tablet"));
        assert!(glob_match("a*c", "abc"));
        assert!(!glob_match("a*c", "abd"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }
}
