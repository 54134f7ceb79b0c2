use std::net::IpAddr;
use std::sync::Arc;
use warden_dns_domain::RecordType;

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// One parsed line from a filter list.
#[derive(Debug, Clone)]
pub enum RuleLine {
    Network(NetworkRule),
    Hosts(HostsRule),
}

/// An adblock-syntax network rule.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    /// The line as written, for the query log.
    pub text: Arc<str>,
    pub pattern: Pattern,
    /// `@@` prefix: exception that suppresses block rules.
    pub exception: bool,
    /// `$important`: supersedes exceptions.
    pub important: bool,
    /// `$client=` selectors; the rule applies only when the query's client
    /// tags include one of them.
    pub client_tags: Vec<String>,
    /// `$dnstype=` restriction; None means all types.
    pub dnstypes: Option<Vec<RecordType>>,
    /// `$denyallow=` carve-outs; the rule does not apply to these domains
    /// or their subdomains.
    pub denyallow: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    /// `||host^` or a bare domain token: host and all subdomains.
    DomainSuffix(String),
    /// `|host` / `|host^`: the name starts at the anchor.
    StartAnchor { host: String, exact: bool },
    /// Unanchored text: substring match anywhere in the name.
    Substring(String),
    /// `/…/`: regular expression over the whole name.
    Regex(String),
    /// `*`: matches every name; only useful with modifiers.
    Any,
}

impl Pattern {
    /// The host a suffix index can key this rule under, if any.
    pub fn anchor_host(&self) -> Option<&str> {
        match self {
            Self::DomainSuffix(host) => Some(host),
            Self::StartAnchor { host, exact: true } => Some(host),
            _ => None,
        }
    }
}

/// A hosts-format line: `IP host [host…]`, meaning rewrite each host → IP.
/// Unspecified and loopback addresses read as plain blocks, matching how
/// hosts-style blocklists are written.
#[derive(Debug, Clone)]
pub struct HostsRule {
    pub text: Arc<str>,
    pub hosts: Vec<String>,
    pub ip: IpAddr,
}

impl HostsRule {
    pub fn is_block(&self) -> bool {
        self.ip.is_unspecified() || self.ip.is_loopback()
    }
}

/// Parse one filter list line. Returns None for blanks and comments, and
/// Err(()) for lines that look like rules but do not parse (counted by the
/// caller, never fatal).
pub fn parse_rule_line(line: &str) -> Result<Option<RuleLine>, ()> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
        return Ok(None);
    }

    // hosts format: "addr host [host…]" — first token parses as an IP
    let mut tokens = line.split_whitespace();
    if let Some(first) = tokens.next() {
        if let Ok(ip) = first.parse::<IpAddr>() {
            let hosts: Vec<String> = tokens
                .take_while(|t| !t.starts_with('#'))
                .filter(|h| !is_self_referential(h) && h.contains('.'))
                .map(|h| h.to_ascii_lowercase())
                .collect();
            if hosts.is_empty() {
                return Ok(None);
            }
            return Ok(Some(RuleLine::Hosts(HostsRule {
                text: Arc::from(line),
                hosts,
                ip,
            })));
        }
    }

    parse_network_rule(line).map(|r| r.map(RuleLine::Network))
}

fn is_self_referential(host: &str) -> bool {
    matches!(
        host,
        "localhost" | "localhost.localdomain" | "broadcasthost" | "ip6-localhost" | "ip6-loopback"
    )
}

fn parse_network_rule(line: &str) -> Result<Option<NetworkRule>, ()> {
    let text: Arc<str> = Arc::from(line);
    let (exception, rest) = match line.strip_prefix("@@") {
        Some(r) => (true, r),
        None => (false, line),
    };

    // Regex rules keep their `$` characters; split modifiers only for the rest.
    let (body, modifiers) = if rest.starts_with('/') && rest.ends_with('/') && rest.len() > 2 {
        (rest, None)
    } else {
        match rest.rsplit_once('$') {
            Some((b, m)) => (b, Some(m)),
            None => (rest, None),
        }
    };

    let mut rule = NetworkRule {
        text,
        pattern: Pattern::Substring(String::new()),
        exception,
        important: false,
        client_tags: Vec::new(),
        dnstypes: None,
        denyallow: Vec::new(),
    };

    if let Some(modifiers) = modifiers {
        for modifier in modifiers.split(',') {
            let modifier = modifier.trim();
            match modifier {
                "important" => rule.important = true,
                _ if modifier.starts_with("client=") => {
                    let value = modifier["client=".len()..].trim_matches('\'').trim_matches('"');
                    rule.client_tags = value
                        .split('|')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                    if rule.client_tags.is_empty() {
                        return Err(());
                    }
                }
                _ if modifier.starts_with("dnstype=") => {
                    let mut types = Vec::new();
                    for t in modifier["dnstype=".len()..].split('|') {
                        match RecordType::parse(t.trim()) {
                            Some(rt) => types.push(rt),
                            None => return Err(()),
                        }
                    }
                    if types.is_empty() {
                        return Err(());
                    }
                    rule.dnstypes = Some(types);
                }
                _ if modifier.starts_with("denyallow=") => {
                    rule.denyallow = modifier["denyallow=".len()..]
                        .split('|')
                        .map(|d| d.trim_end_matches('.').to_ascii_lowercase())
                        .filter(|d| !d.is_empty())
                        .collect();
                    if rule.denyallow.is_empty() {
                        return Err(());
                    }
                }
                _ => return Err(()),
            }
        }
    }

    rule.pattern = parse_pattern(body)?;
    Ok(Some(rule))
}

fn parse_pattern(body: &str) -> Result<Pattern, ()> {
    if body.is_empty() {
        return Err(());
    }

    if body.starts_with('/') && body.ends_with('/') && body.len() > 2 {
        return Ok(Pattern::Regex(body[1..body.len() - 1].to_string()));
    }

    if let Some(rest) = body.strip_prefix("||") {
        let host = rest.trim_end_matches('^').trim_end_matches('.');
        if host.is_empty() || host.contains('/') {
            return Err(());
        }
        return Ok(Pattern::DomainSuffix(host.to_ascii_lowercase()));
    }

    if let Some(rest) = body.strip_prefix('|') {
        let exact = rest.ends_with('^') || rest.ends_with('|');
        let host = rest.trim_end_matches('|').trim_end_matches('^');
        if host.is_empty() {
            return Err(());
        }
        return Ok(Pattern::StartAnchor {
            host: host.to_ascii_lowercase(),
            exact,
        });
    }

    // A bare domain token blocks the domain and its subdomains.
    let stripped = body.trim_end_matches('^');
    if stripped.contains('.')
        && !stripped.contains('*')
        && stripped
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Ok(Pattern::DomainSuffix(stripped.to_ascii_lowercase()));
    }

    // Anything else is an unanchored substring; `*` is a free wildcard in
    // adblock syntax and substring semantics already absorb it at the ends.
    let needle = body.trim_matches('*').to_ascii_lowercase();
    if needle.is_empty() {
        return if body.chars().all(|c| c == '*') {
            Ok(Pattern::Any)
        } else {
            Err(())
        };
    }
    if needle.contains('*') {
        // Interior wildcards become a regex.
        let escaped = regex_escape(&needle).replace("\\*", ".*");
        return Ok(Pattern::Regex(escaped));
    }
    Ok(Pattern::Substring(needle))
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if "\\.+?()[]{}|^$*".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Whether `name` is `host` or one of its subdomains.
pub fn domain_or_subdomain(name: &str, host: &str) -> bool {
    name == host
        || (name.len() > host.len()
            && name.ends_with(host)
            && name.as_bytes()[name.len() - host.len() - 1] == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(line: &str) -> NetworkRule {
        match parse_rule_line(line).unwrap().unwrap() {
            RuleLine::Network(r) => r,
            other => panic!("expected network rule, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_domain_suffix() {
        let r = network("||ads.example.com^");
        assert!(matches!(r.pattern, Pattern::DomainSuffix(ref h) if h == "ads.example.com"));
        assert!(!r.exception);
    }

    #[test]
    fn test_parse_exception() {
        let r = network("@@||ok.example.com^");
        assert!(r.exception);
        assert!(matches!(r.pattern, Pattern::DomainSuffix(ref h) if h == "ok.example.com"));
    }

    #[test]
    fn test_parse_important_modifier() {
        let r = network("||ads.example.com^$important");
        assert!(r.important);
    }

    #[test]
    fn test_parse_client_modifier() {
        let r = network("||ads.example.com^$client=kids|guests");
        assert_eq!(r.client_tags, vec!["kids", "guests"]);
    }

    #[test]
    fn test_parse_dnstype_modifier() {
        let r = network("||tracker.net^$dnstype=A|AAAA");
        assert_eq!(
            r.dnstypes,
            Some(vec![RecordType::A, RecordType::AAAA])
        );
    }

    #[test]
    fn test_parse_denyallow_modifier() {
        let r = network("*$denyallow=example.com|example.org");
        assert_eq!(r.denyallow.len(), 2);
    }

    #[test]
    fn test_parse_bare_domain_is_suffix_rule() {
        let r = network("ads.example.com");
        assert!(matches!(r.pattern, Pattern::DomainSuffix(ref h) if h == "ads.example.com"));
    }

    #[test]
    fn test_parse_start_anchor() {
        let r = network("|tracker.example.com^");
        assert!(
            matches!(r.pattern, Pattern::StartAnchor { ref host, exact } if host == "tracker.example.com" && exact)
        );
    }

    #[test]
    fn test_parse_regex_rule() {
        let r = network("/^ads[0-9]+\\./");
        assert!(matches!(r.pattern, Pattern::Regex(_)));
    }

    #[test]
    fn test_parse_hosts_line() {
        match parse_rule_line("0.0.0.0 doubleclick.example").unwrap().unwrap() {
            RuleLine::Hosts(h) => {
                assert_eq!(h.hosts, vec!["doubleclick.example"]);
                assert!(h.is_block());
            }
            other => panic!("expected hosts rule, got {other:?}"),
        }
    }

    #[test]
    fn test_hosts_line_with_real_ip_is_rewrite() {
        match parse_rule_line("192.168.1.10 nas.lan").unwrap().unwrap() {
            RuleLine::Hosts(h) => assert!(!h.is_block()),
            other => panic!("expected hosts rule, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_comments_and_blanks() {
        assert!(parse_rule_line("! comment").unwrap().is_none());
        assert!(parse_rule_line("# comment").unwrap().is_none());
        assert!(parse_rule_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_skip_localhost_hosts_entries() {
        assert!(parse_rule_line("127.0.0.1 localhost").unwrap().is_none());
        assert!(parse_rule_line(":: ip6-localhost").unwrap().is_none());
    }

    #[test]
    fn test_unknown_modifier_is_invalid() {
        assert!(parse_rule_line("||x.com^$badmod").is_err());
    }

    #[test]
    fn test_domain_or_subdomain() {
        assert!(domain_or_subdomain("example.com", "example.com"));
        assert!(domain_or_subdomain("www.example.com", "example.com"));
        assert!(!domain_or_subdomain("badexample.com", "example.com"));
        assert!(!domain_or_subdomain("example.com", "www.example.com"));
    }
}
