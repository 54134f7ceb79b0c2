use rustc_hash::FxHashMap;
use std::net::IpAddr;
use tracing::warn;
use warden_dns_domain::{RecordType, Rewrite, RewriteAnswer, RewriteOutcome};

/// Most hops a CNAME rewrite chain may take before it is cut.
const MAX_CNAME_HOPS: usize = 5;

/// Static domain → answer table, evaluated before everything else.
///
/// Exact entries beat wildcards; among wildcards the longest suffix wins.
pub struct RewriteTable {
    exact: FxHashMap<String, Vec<RewriteAnswer>>,
    /// (suffix without the `*.`, answers), longest suffix first.
    wildcards: Vec<(String, Vec<RewriteAnswer>)>,
}

impl RewriteTable {
    pub fn build(rewrites: &[Rewrite]) -> Self {
        let mut exact: FxHashMap<String, Vec<RewriteAnswer>> = FxHashMap::default();
        let mut wildcards: FxHashMap<String, Vec<RewriteAnswer>> = FxHashMap::default();

        for rewrite in rewrites {
            let answer = match rewrite.parse_answer() {
                Ok(a) => a,
                Err(e) => {
                    warn!(domain = %rewrite.domain, error = %e, "Skipping bad rewrite");
                    continue;
                }
            };
            if let Some(suffix) = rewrite.domain.strip_prefix("*.") {
                let entry = wildcards.entry(suffix.to_string()).or_default();
                if !entry.contains(&answer) {
                    entry.push(answer);
                }
            } else {
                let entry = exact.entry(rewrite.domain.clone()).or_default();
                // Duplicate (domain, answer) pairs are allowed but idempotent.
                if !entry.contains(&answer) {
                    entry.push(answer);
                }
            }
        }

        let mut wildcards: Vec<(String, Vec<RewriteAnswer>)> = wildcards.into_iter().collect();
        wildcards.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self { exact, wildcards }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty()
    }

    fn answers_for(&self, name: &str) -> Option<&Vec<RewriteAnswer>> {
        if let Some(answers) = self.exact.get(name) {
            return Some(answers);
        }
        self.wildcards
            .iter()
            .find(|(suffix, _)| {
                name.len() > suffix.len()
                    && name.ends_with(suffix.as_str())
                    && name.as_bytes()[name.len() - suffix.len() - 1] == b'.'
            })
            .map(|(_, answers)| answers)
    }

    /// Resolve `name` through the table, following CNAME rewrites.
    ///
    /// Returns None when no rewrite applies (including a typed `A`/`AAAA`
    /// passthrough hole for the queried type). An outcome with a `cname`
    /// and no addresses means the caller resolves the target upstream.
    pub fn resolve(&self, name: &str, qtype: RecordType) -> Option<RewriteOutcome> {
        let mut current = name.to_string();
        let mut hopped = false;

        for _ in 0..MAX_CNAME_HOPS {
            let answers = match self.answers_for(&current) {
                Some(a) => a,
                None => {
                    return hopped.then(|| RewriteOutcome {
                        cname: Some(current),
                        answers: vec![],
                    });
                }
            };

            // A typed passthrough hole disables the rewrite for that type.
            let passthrough = answers.iter().any(|a| match (a, qtype) {
                (RewriteAnswer::PassA, RecordType::A) => true,
                (RewriteAnswer::PassAaaa, RecordType::AAAA) => true,
                _ => false,
            });
            if passthrough && !hopped {
                return None;
            }

            if let Some(RewriteAnswer::Cname(target)) = answers
                .iter()
                .find(|a| matches!(a, RewriteAnswer::Cname(_)))
            {
                if target == &current || target == name {
                    // Cycle; answer with what we have so far.
                    return Some(RewriteOutcome {
                        cname: Some(current),
                        answers: vec![],
                    });
                }
                current = target.clone();
                hopped = true;
                continue;
            }

            let ips: Vec<IpAddr> = answers
                .iter()
                .filter_map(|a| match (a, qtype) {
                    (RewriteAnswer::A(_), RecordType::A) => a.ip(),
                    (RewriteAnswer::Aaaa(_), RecordType::AAAA) => a.ip(),
                    _ => None,
                })
                .collect();

            return Some(RewriteOutcome {
                cname: hopped.then_some(current),
                answers: ips,
            });
        }

        // Hop limit reached.
        Some(RewriteOutcome {
            cname: Some(current),
            answers: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> RewriteTable {
        let rewrites: Vec<Rewrite> = entries
            .iter()
            .map(|(d, a)| Rewrite::new(*d, *a))
            .collect();
        RewriteTable::build(&rewrites)
    }

    #[test]
    fn test_exact_a_rewrite() {
        let t = table(&[("my.lan", "192.168.1.10")]);
        let out = t.resolve("my.lan", RecordType::A).unwrap();
        assert_eq!(out.answers, vec!["192.168.1.10".parse::<IpAddr>().unwrap()]);
        assert!(out.cname.is_none());
    }

    #[test]
    fn test_wildcard_matches_subdomains_only() {
        let t = table(&[("*.lan", "10.0.0.1")]);
        assert!(t.resolve("nas.lan", RecordType::A).is_some());
        assert!(t.resolve("lan", RecordType::A).is_none());
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let t = table(&[("*.lan", "10.0.0.1"), ("nas.lan", "10.0.0.2")]);
        let out = t.resolve("nas.lan", RecordType::A).unwrap();
        assert_eq!(out.answers, vec!["10.0.0.2".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_longest_wildcard_wins() {
        let t = table(&[("*.lan", "10.0.0.1"), ("*.iot.lan", "10.0.0.3")]);
        let out = t.resolve("cam.iot.lan", RecordType::A).unwrap();
        assert_eq!(out.answers, vec!["10.0.0.3".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_cname_chain_resolves() {
        let t = table(&[("alias.lan", "real.lan"), ("real.lan", "10.0.0.9")]);
        let out = t.resolve("alias.lan", RecordType::A).unwrap();
        assert_eq!(out.cname.as_deref(), Some("real.lan"));
        assert_eq!(out.answers, vec!["10.0.0.9".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_cname_to_unmapped_target() {
        let t = table(&[("alias.lan", "external.example.com")]);
        let out = t.resolve("alias.lan", RecordType::A).unwrap();
        assert_eq!(out.cname.as_deref(), Some("external.example.com"));
        assert!(out.answers.is_empty());
    }

    #[test]
    fn test_cname_cycle_is_cut() {
        let t = table(&[("a.lan", "b.lan"), ("b.lan", "a.lan")]);
        let out = t.resolve("a.lan", RecordType::A).unwrap();
        assert!(out.answers.is_empty());
    }

    #[test]
    fn test_typed_passthrough_hole() {
        let t = table(&[("*.lan", "10.0.0.1"), ("up.lan", "A")]);
        assert!(t.resolve("up.lan", RecordType::A).is_none());
        // AAAA still covered by the wildcard (no answers of that family)
        let out = t.resolve("up.lan", RecordType::AAAA).unwrap();
        assert!(out.answers.is_empty());
    }

    #[test]
    fn test_aaaa_rewrite() {
        let t = table(&[("v6.lan", "fd00::10")]);
        let out = t.resolve("v6.lan", RecordType::AAAA).unwrap();
        assert_eq!(out.answers, vec!["fd00::10".parse::<IpAddr>().unwrap()]);
        assert!(t.resolve("v6.lan", RecordType::A).unwrap().answers.is_empty());
    }
}
