use super::rules::{domain_or_subdomain, parse_rule_line, NetworkRule, Pattern, RuleLine};
use aho_corasick::AhoCorasick;
use compact_str::CompactString;
use fancy_regex::Regex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_dns_domain::{Decision, MatchRequest, RewriteOutcome};

/// Source text of one rule list handed to the compiler.
pub struct ListInput {
    pub list_id: i64,
    /// Exception lists flip every rule into an allow rule.
    pub is_allowlist: bool,
    pub text: String,
}

struct CompiledRule {
    list_id: i64,
    rule: NetworkRule,
    regex: Option<Regex>,
    /// True when the rule allows (exception syntax, or any rule from an
    /// allowlist-kind list).
    allows: bool,
}

struct HostsEntry {
    text: Arc<str>,
    list_id: i64,
    v4: Option<IpAddr>,
    v6: Option<IpAddr>,
    block: bool,
}

/// The compiled matcher: built from enabled lists plus user rules, replaced
/// as a whole, never mutated.
///
/// Rules with an anchor host are grouped under that host so a single hash
/// lookup per label suffix narrows the candidates; unanchored substring
/// rules share one aho-corasick automaton; regex and `*` rules fall back to
/// a short linear scan.
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
    by_host: FxHashMap<CompactString, SmallVec<[u32; 4]>>,
    substring_ac: Option<AhoCorasick>,
    /// Parallel to the automaton's pattern ids.
    substring_rule_ids: Vec<u32>,
    scan: Vec<u32>,
    hosts: FxHashMap<CompactString, HostsEntry>,
    pub rule_count: u64,
    pub invalid_count: u64,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::compile(Vec::new())
    }
}

impl RuleMatcher {
    pub fn compile(inputs: Vec<ListInput>) -> Self {
        // Parse lists in parallel, then assemble the indices in input order
        // so canonical rule order is preserved.
        let parsed: Vec<(i64, bool, Vec<RuleLine>, u64)> = inputs
            .par_iter()
            .map(|input| {
                let mut lines = Vec::new();
                let mut invalid = 0u64;
                for line in input.text.lines() {
                    match parse_rule_line(line) {
                        Ok(Some(rule)) => lines.push(rule),
                        Ok(None) => {}
                        Err(()) => invalid += 1,
                    }
                }
                (input.list_id, input.is_allowlist, lines, invalid)
            })
            .collect();

        let mut matcher = RuleMatcher {
            rules: Vec::new(),
            by_host: FxHashMap::default(),
            substring_ac: None,
            substring_rule_ids: Vec::new(),
            scan: Vec::new(),
            hosts: FxHashMap::default(),
            rule_count: 0,
            invalid_count: 0,
        };

        let mut substrings: Vec<String> = Vec::new();

        for (list_id, is_allowlist, lines, invalid) in parsed {
            matcher.invalid_count += invalid;
            for line in lines {
                match line {
                    RuleLine::Network(rule) => {
                        matcher.add_network(list_id, is_allowlist, rule, &mut substrings);
                    }
                    RuleLine::Hosts(rule) => {
                        let block = rule.is_block();
                        for host in &rule.hosts {
                            let entry = matcher
                                .hosts
                                .entry(CompactString::new(host))
                                .or_insert_with(|| HostsEntry {
                                    text: Arc::clone(&rule.text),
                                    list_id,
                                    v4: None,
                                    v6: None,
                                    block,
                                });
                            match rule.ip {
                                IpAddr::V4(_) if entry.v4.is_none() => entry.v4 = Some(rule.ip),
                                IpAddr::V6(_) if entry.v6.is_none() => entry.v6 = Some(rule.ip),
                                _ => {}
                            }
                            matcher.rule_count += 1;
                        }
                    }
                }
            }
        }

        if !substrings.is_empty() {
            match AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&substrings)
            {
                Ok(ac) => matcher.substring_ac = Some(ac),
                Err(e) => {
                    warn!(error = %e, "Failed to build substring automaton; falling back to scan");
                    matcher.scan.extend(matcher.substring_rule_ids.drain(..));
                }
            }
        }

        debug!(
            rules = matcher.rule_count,
            invalid = matcher.invalid_count,
            hosts = matcher.hosts.len(),
            "Rule matcher compiled"
        );
        matcher
    }

    fn add_network(
        &mut self,
        list_id: i64,
        is_allowlist: bool,
        rule: NetworkRule,
        substrings: &mut Vec<String>,
    ) {
        let id = self.rules.len() as u32;
        let regex = match &rule.pattern {
            Pattern::Regex(src) => match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!(rule = %rule.text, error = %e, "Skipping bad regex rule");
                    self.invalid_count += 1;
                    return;
                }
            },
            _ => None,
        };

        match &rule.pattern {
            Pattern::DomainSuffix(host) | Pattern::StartAnchor { host, exact: true } => {
                self.by_host
                    .entry(CompactString::new(host))
                    .or_default()
                    .push(id);
            }
            Pattern::Substring(needle) => {
                substrings.push(needle.clone());
                self.substring_rule_ids.push(id);
            }
            Pattern::StartAnchor { .. } | Pattern::Regex(_) | Pattern::Any => {
                self.scan.push(id);
            }
        }

        let allows = is_allowlist || rule.exception;
        self.rules.push(CompiledRule {
            list_id,
            rule,
            regex,
            allows,
        });
        self.rule_count += 1;
    }

    /// Evaluate the network rules for one query.
    ///
    /// Outcome selection: `$important` block > exception > block; within a
    /// class the rule compiled first wins (list order is canonical order).
    pub fn match_request(&self, request: &MatchRequest) -> Decision {
        let name = request.name.as_str();

        let mut candidates: SmallVec<[u32; 8]> = SmallVec::new();

        // Anchored rules: one lookup per label suffix.
        let mut suffix = name;
        loop {
            if let Some(ids) = self.by_host.get(suffix) {
                candidates.extend_from_slice(ids);
            }
            match suffix.find('.') {
                Some(i) => suffix = &suffix[i + 1..],
                None => break,
            }
        }

        // Substring rules via the shared automaton.
        if let Some(ac) = &self.substring_ac {
            for m in ac.find_overlapping_iter(name) {
                candidates.push(self.substring_rule_ids[m.pattern().as_usize()]);
            }
        }

        // Start-anchor (prefix), regex, and `*` rules.
        candidates.extend_from_slice(&self.scan);

        candidates.sort_unstable();
        candidates.dedup();

        let mut important: Option<&CompiledRule> = None;
        let mut allow: Option<&CompiledRule> = None;
        let mut block: Option<&CompiledRule> = None;

        for &id in &candidates {
            let compiled = &self.rules[id as usize];
            if !self.rule_applies(compiled, request) {
                continue;
            }
            if compiled.rule.important && !compiled.allows {
                important.get_or_insert(compiled);
            } else if compiled.allows {
                allow.get_or_insert(compiled);
            } else {
                block.get_or_insert(compiled);
            }
        }

        if let Some(rule) = important {
            return Decision::Block {
                rule: Arc::clone(&rule.rule.text),
                list_id: rule.list_id,
            };
        }
        if let Some(rule) = allow {
            return Decision::Allow {
                rule: Arc::clone(&rule.rule.text),
                list_id: rule.list_id,
            };
        }
        if let Some(entry) = self.match_hosts(request) {
            return entry;
        }
        if let Some(rule) = block {
            return Decision::Block {
                rule: Arc::clone(&rule.rule.text),
                list_id: rule.list_id,
            };
        }
        Decision::Pass
    }

    fn match_hosts(&self, request: &MatchRequest) -> Option<Decision> {
        let entry = self.hosts.get(request.name.as_str())?;
        if entry.block {
            return Some(Decision::Block {
                rule: Arc::clone(&entry.text),
                list_id: entry.list_id,
            });
        }
        use warden_dns_domain::RecordType;
        let answers: Vec<IpAddr> = match request.qtype {
            RecordType::A => entry.v4.into_iter().collect(),
            RecordType::AAAA => entry.v6.into_iter().collect(),
            _ => return None,
        };
        Some(Decision::Rewrite(RewriteOutcome {
            cname: None,
            answers,
        }))
    }

    fn rule_applies(&self, compiled: &CompiledRule, request: &MatchRequest) -> bool {
        let rule = &compiled.rule;
        let name = request.name.as_str();

        if let Some(types) = &rule.dnstypes {
            if !types.contains(&request.qtype) {
                return false;
            }
        }

        if !rule.client_tags.is_empty() {
            let tagged = rule
                .client_tags
                .iter()
                .any(|t| request.client_tags.iter().any(|ct| ct.as_ref() == t));
            if !tagged {
                return false;
            }
        }

        for carved in &rule.denyallow {
            if domain_or_subdomain(name, carved) {
                return false;
            }
        }

        match &rule.pattern {
            Pattern::DomainSuffix(host) => domain_or_subdomain(name, host),
            Pattern::StartAnchor { host, exact } => {
                if *exact {
                    name == host
                } else {
                    name.starts_with(host.as_str())
                }
            }
            Pattern::Substring(needle) => name.contains(needle.as_str()),
            Pattern::Regex(_) => compiled
                .regex
                .as_ref()
                .map(|re| re.is_match(name).unwrap_or(false))
                .unwrap_or(false),
            Pattern::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_dns_domain::RecordType;

    fn compile(lines: &[&str]) -> RuleMatcher {
        RuleMatcher::compile(vec![ListInput {
            list_id: 1,
            is_allowlist: false,
            text: lines.join("\n"),
        }])
    }

    fn req(name: &str) -> MatchRequest {
        MatchRequest::new(name, RecordType::A)
    }

    #[test]
    fn test_block_domain_and_subdomains() {
        let m = compile(&["||ads.example.com^"]);
        assert!(matches!(m.match_request(&req("ads.example.com")), Decision::Block { .. }));
        assert!(matches!(m.match_request(&req("x.ads.example.com")), Decision::Block { .. }));
        assert!(matches!(m.match_request(&req("example.com")), Decision::Pass));
    }

    #[test]
    fn test_exception_beats_block() {
        let m = compile(&["||x.com^", "@@||x.com^"]);
        assert!(matches!(m.match_request(&req("x.com")), Decision::Allow { .. }));
    }

    #[test]
    fn test_important_beats_exception() {
        let m = compile(&["||x.com^$important", "@@||x.com^"]);
        assert!(matches!(m.match_request(&req("x.com")), Decision::Block { .. }));
    }

    #[test]
    fn test_exception_on_subdomain_only() {
        let m = compile(&["||ads.example.com^", "@@||ok.ads.example.com^"]);
        assert!(matches!(m.match_request(&req("ok.ads.example.com")), Decision::Allow { .. }));
        assert!(matches!(m.match_request(&req("ads.example.com")), Decision::Block { .. }));
    }

    #[test]
    fn test_dnstype_restriction() {
        let m = compile(&["||v6.example.com^$dnstype=AAAA"]);
        assert!(matches!(m.match_request(&req("v6.example.com")), Decision::Pass));
        let aaaa = MatchRequest::new("v6.example.com", RecordType::AAAA);
        assert!(matches!(m.match_request(&aaaa), Decision::Block { .. }));
    }

    #[test]
    fn test_client_tag_selector() {
        let m = compile(&["||game.example.com^$client=kids"]);
        assert!(matches!(m.match_request(&req("game.example.com")), Decision::Pass));
        let tagged = req("game.example.com").with_tags(vec![Arc::from("kids")]);
        assert!(matches!(m.match_request(&tagged), Decision::Block { .. }));
    }

    #[test]
    fn test_denyallow_carves_out() {
        let m = compile(&["*$denyallow=example.com"]);
        assert!(matches!(m.match_request(&req("tracker.net")), Decision::Block { .. }));
        assert!(matches!(m.match_request(&req("www.example.com")), Decision::Pass));
    }

    #[test]
    fn test_hosts_block_entry() {
        let m = compile(&["0.0.0.0 blocked.example.net"]);
        assert!(matches!(m.match_request(&req("blocked.example.net")), Decision::Block { .. }));
    }

    #[test]
    fn test_hosts_rewrite_entry() {
        let m = compile(&["192.168.1.10 nas.lan"]);
        match m.match_request(&req("nas.lan")) {
            Decision::Rewrite(out) => {
                assert_eq!(out.answers, vec!["192.168.1.10".parse::<IpAddr>().unwrap()]);
            }
            other => panic!("expected rewrite, got {other:?}"),
        }
    }

    #[test]
    fn test_allowlist_kind_flips_rules() {
        let m = RuleMatcher::compile(vec![
            ListInput {
                list_id: 1,
                is_allowlist: false,
                text: "||cdn.example.com^".into(),
            },
            ListInput {
                list_id: 2,
                is_allowlist: true,
                text: "||cdn.example.com^".into(),
            },
        ]);
        assert!(matches!(m.match_request(&req("cdn.example.com")), Decision::Allow { list_id: 2, .. }));
    }

    #[test]
    fn test_substring_rule() {
        let m = compile(&["track"]);
        // "track" has no dot, so it parses as a substring rule
        assert!(matches!(m.match_request(&req("tracker.example.org")), Decision::Block { .. }));
        assert!(matches!(m.match_request(&req("example.org")), Decision::Pass));
    }

    #[test]
    fn test_regex_rule() {
        let m = compile(&["/^ads[0-9]+\\./"]);
        assert!(matches!(m.match_request(&req("ads12.example.com")), Decision::Block { .. }));
        assert!(matches!(m.match_request(&req("ads.example.com")), Decision::Pass));
    }

    #[test]
    fn test_invalid_lines_counted_not_fatal() {
        let m = compile(&["||good.example.com^", "||bad.example.com^$nope"]);
        assert_eq!(m.invalid_count, 1);
        assert!(matches!(m.match_request(&req("good.example.com")), Decision::Block { .. }));
    }

    #[test]
    fn test_first_rule_in_order_wins() {
        let m = compile(&["||dup.example.com^$dnstype=A", "||dup.example.com^"]);
        match m.match_request(&req("dup.example.com")) {
            Decision::Block { rule, .. } => assert_eq!(rule.as_ref(), "||dup.example.com^$dnstype=A"),
            other => panic!("expected block, got {other:?}"),
        }
    }
}
