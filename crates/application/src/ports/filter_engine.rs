use std::sync::Arc;
use warden_dns_domain::{Decision, MatchRequest};

/// Per-query filtering context, resolved from global settings merged with
/// the matched client's own settings.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub filtering_enabled: bool,
    pub safebrowsing_enabled: bool,
    pub parental_enabled: bool,
    pub safesearch_enabled: bool,
    /// Effective blocked services for this query's client.
    pub blocked_services: Vec<Arc<str>>,
}

impl FilterContext {
    pub fn disabled() -> Self {
        Self {
            filtering_enabled: false,
            safebrowsing_enabled: false,
            parental_enabled: false,
            safesearch_enabled: false,
            blocked_services: Vec::new(),
        }
    }
}

/// The filtering seam the DNS frontend calls on every query. Evaluation is
/// synchronous and lock-free after the snapshot pointer load.
pub trait FilterEnginePort: Send + Sync {
    fn evaluate(&self, request: &MatchRequest, ctx: &FilterContext) -> Decision;
}
