use super::matcher::RuleMatcher;
use super::rewrites::RewriteTable;
use super::safe_browsing::{HostSetFilter, SafetyHit};
use super::safe_search::SafeSearch;
use super::services::ServiceCatalog;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;
use warden_dns_application::ports::{FilterContext, FilterEnginePort};
use warden_dns_domain::{Decision, MatchRequest};

/// Everything the data plane needs to decide one query. Built off the hot
/// path, published atomically, never mutated.
pub struct FilteringSnapshot {
    pub matcher: RuleMatcher,
    pub rewrites: RewriteTable,
    pub services: ServiceCatalog,
    pub safe_search: SafeSearch,
    pub safe_browsing: HostSetFilter,
    pub parental: HostSetFilter,
}

impl FilteringSnapshot {
    pub fn empty() -> Self {
        Self {
            matcher: RuleMatcher::default(),
            rewrites: RewriteTable::build(&[]),
            services: ServiceCatalog::build(),
            safe_search: SafeSearch::build(),
            safe_browsing: HostSetFilter::safe_browsing(Vec::new()),
            parental: HostSetFilter::parental(Vec::new()),
        }
    }
}

/// The filtering engine: ordered evaluation over the current snapshot.
///
/// Evaluation order per query:
///   1. static rewrites (exact beats wildcard)
///   2. per-service blocks (allowlist-respecting)
///   3. allow rules (short-circuit unless an `$important` block matches)
///   4. block rules
/// Safety transforms (safe-browsing / parental / safe-search) rewrite the
/// answer, not the query, and are exposed separately for the frontend.
pub struct FilterEngine {
    snapshot: ArcSwap<FilteringSnapshot>,
}

impl FilterEngine {
    pub fn new(snapshot: FilteringSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Atomically publish a rebuilt snapshot. In-flight queries finish
    /// against the one they already loaded.
    pub fn install(&self, snapshot: FilteringSnapshot) {
        info!(
            rules = snapshot.matcher.rule_count,
            invalid = snapshot.matcher.invalid_count,
            "Filtering snapshot installed"
        );
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn load(&self) -> arc_swap::Guard<Arc<FilteringSnapshot>> {
        self.snapshot.load()
    }

    /// Safety transforms for a name the matcher passed. Checked after the
    /// decision so an exception rule cannot bypass them accidentally being
    /// ordered first.
    pub fn safety_check(&self, name: &str, ctx: &FilterContext) -> Option<SafetyHit> {
        let snapshot = self.snapshot.load();
        if ctx.safebrowsing_enabled && snapshot.safe_browsing.covers(name) {
            return Some(SafetyHit {
                reason: snapshot.safe_browsing.reason(),
                block_host: snapshot.safe_browsing.block_host(),
            });
        }
        if ctx.parental_enabled && snapshot.parental.covers(name) {
            return Some(SafetyHit {
                reason: snapshot.parental.reason(),
                block_host: snapshot.parental.block_host(),
            });
        }
        None
    }

    /// Safe-search substitution host for `name`, when enabled for the query.
    pub fn safe_search_host(&self, name: &str, ctx: &FilterContext) -> Option<&'static str> {
        if !ctx.safesearch_enabled {
            return None;
        }
        self.snapshot.load().safe_search.safe_host(name)
    }
}

impl FilterEnginePort for FilterEngine {
    fn evaluate(&self, request: &MatchRequest, ctx: &FilterContext) -> Decision {
        let snapshot = self.snapshot.load();

        // 1. Static rewrites win outright.
        if let Some(outcome) = snapshot.rewrites.resolve(&request.name, request.qtype) {
            return Decision::Rewrite(outcome);
        }

        if !ctx.filtering_enabled {
            return Decision::Pass;
        }

        // 3/4. Rule sets; the matcher already orders important > allow > block.
        let decision = snapshot.matcher.match_request(request);

        // An allow rule suppresses service blocks too.
        if let Decision::Allow { .. } = decision {
            return decision;
        }

        // 2. Per-service blocks come before blocklist hits, so a service
        // match is what lands in the log even when a list also covers it.
        if let Some((service, rule)) = snapshot
            .services
            .match_name(&request.name, &ctx.blocked_services)
        {
            return Decision::BlockService {
                name: Arc::from(service),
                rule: Arc::from(rule),
            };
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::super::matcher::ListInput;
    use super::*;
    use warden_dns_domain::{RecordType, Rewrite};

    fn ctx() -> FilterContext {
        FilterContext {
            filtering_enabled: true,
            safebrowsing_enabled: false,
            parental_enabled: false,
            safesearch_enabled: false,
            blocked_services: vec![],
        }
    }

    fn engine_with_rules(lines: &[&str]) -> FilterEngine {
        let mut snapshot = FilteringSnapshot::empty();
        snapshot.matcher = RuleMatcher::compile(vec![ListInput {
            list_id: 1,
            is_allowlist: false,
            text: lines.join("\n"),
        }]);
        FilterEngine::new(snapshot)
    }

    #[test]
    fn test_rewrite_wins_over_block() {
        let mut snapshot = FilteringSnapshot::empty();
        snapshot.matcher = RuleMatcher::compile(vec![ListInput {
            list_id: 1,
            is_allowlist: false,
            text: "||my.lan^".into(),
        }]);
        snapshot.rewrites = RewriteTable::build(&[Rewrite::new("my.lan", "192.168.1.10")]);
        let engine = FilterEngine::new(snapshot);
        let decision = engine.evaluate(&MatchRequest::new("my.lan", RecordType::A), &ctx());
        assert!(matches!(decision, Decision::Rewrite(_)));
    }

    #[test]
    fn test_service_block_reported_over_list_block() {
        let mut context = ctx();
        context.blocked_services = vec![Arc::from("facebook")];
        let engine = engine_with_rules(&["||facebook.com^"]);
        let decision = engine.evaluate(
            &MatchRequest::new("www.facebook.com", RecordType::A),
            &context,
        );
        match decision {
            Decision::BlockService { name, .. } => assert_eq!(name.as_ref(), "facebook"),
            other => panic!("expected service block, got {other:?}"),
        }
    }

    #[test]
    fn test_allow_suppresses_service_block() {
        let mut context = ctx();
        context.blocked_services = vec![Arc::from("facebook")];
        let engine = engine_with_rules(&["@@||www.facebook.com^"]);
        let decision = engine.evaluate(
            &MatchRequest::new("www.facebook.com", RecordType::A),
            &context,
        );
        assert!(matches!(decision, Decision::Allow { .. }));
    }

    #[test]
    fn test_filtering_disabled_passes_rules_but_keeps_rewrites() {
        let mut snapshot = FilteringSnapshot::empty();
        snapshot.matcher = RuleMatcher::compile(vec![ListInput {
            list_id: 1,
            is_allowlist: false,
            text: "||ads.example.com^".into(),
        }]);
        snapshot.rewrites = RewriteTable::build(&[Rewrite::new("my.lan", "10.0.0.1")]);
        let engine = FilterEngine::new(snapshot);
        let off = FilterContext::disabled();
        assert!(matches!(
            engine.evaluate(&MatchRequest::new("ads.example.com", RecordType::A), &off),
            Decision::Pass
        ));
        assert!(matches!(
            engine.evaluate(&MatchRequest::new("my.lan", RecordType::A), &off),
            Decision::Rewrite(_)
        ));
    }

    #[test]
    fn test_safety_check_only_when_enabled() {
        let mut snapshot = FilteringSnapshot::empty();
        snapshot.safe_browsing =
            HostSetFilter::safe_browsing(vec!["malware.example".to_string()]);
        let engine = FilterEngine::new(snapshot);
        assert!(engine.safety_check("malware.example", &ctx()).is_none());
        let mut on = ctx();
        on.safebrowsing_enabled = true;
        assert!(engine.safety_check("malware.example", &on).is_some());
    }

    #[test]
    fn test_snapshot_swap_changes_decisions() {
        let engine = engine_with_rules(&["||old.example.com^"]);
        let request = MatchRequest::new("old.example.com", RecordType::A);
        assert!(matches!(engine.evaluate(&request, &ctx()), Decision::Block { .. }));

        engine.install(FilteringSnapshot::empty());
        assert!(matches!(engine.evaluate(&request, &ctx()), Decision::Pass));
    }
}
