use super::rules::domain_or_subdomain;
use rustc_hash::FxHashSet;
use warden_dns_domain::FilterReason;

/// A host-set safety engine (safe-browsing or parental).
///
/// The hosted lookup service behind the original is an external
/// collaborator; this engine answers from a locally loaded host set behind
/// the same seam, so a service-backed implementation can replace it without
/// touching the pipeline. A hit rewrites the answer to the engine's block
/// host, not the query.
pub struct HostSetFilter {
    reason: FilterReason,
    block_host: &'static str,
    hosts: FxHashSet<String>,
}

impl HostSetFilter {
    pub fn safe_browsing(hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            reason: FilterReason::FilteredSafeBrowsing,
            block_host: "standard-block.dns.warden.invalid",
            hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn parental(hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            reason: FilterReason::FilteredParental,
            block_host: "family-block.dns.warden.invalid",
            hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn reason(&self) -> FilterReason {
        self.reason
    }

    pub fn block_host(&self) -> &'static str {
        self.block_host
    }

    /// Whether `name` or a parent domain of it is in the set.
    pub fn covers(&self, name: &str) -> bool {
        if self.hosts.is_empty() {
            return false;
        }
        let mut suffix = name;
        loop {
            if self.hosts.contains(suffix) {
                return domain_or_subdomain(name, suffix);
            }
            match suffix.find('.') {
                Some(i) => suffix = &suffix[i + 1..],
                None => return false,
            }
        }
    }
}

/// The outcome of a safety check, attached by the frontend to the response.
#[derive(Debug, Clone, Copy)]
pub struct SafetyHit {
    pub reason: FilterReason,
    pub block_host: &'static str,
}
