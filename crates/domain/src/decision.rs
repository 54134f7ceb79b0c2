use crate::record_type::RecordType;
use crate::rewrite::RewriteOutcome;
use serde::Serialize;
use std::sync::Arc;

/// Input to the rule matcher. Plain struct with explicit fields; the matcher
/// never inspects anything beyond these.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    /// Lowercased query name without the trailing dot.
    pub name: String,
    pub qtype: RecordType,
    /// Tags of the client the query came from (`$client=` selectors).
    pub client_tags: Vec<Arc<str>>,
}

impl MatchRequest {
    pub fn new(name: impl Into<String>, qtype: RecordType) -> Self {
        let mut name = name.into().to_ascii_lowercase();
        if name.ends_with('.') {
            name.pop();
        }
        Self {
            name,
            qtype,
            client_tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Arc<str>>) -> Self {
        self.client_tags = tags;
        self
    }
}

/// The matcher's tagged result for a single query.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No rule applied; forward upstream.
    Pass,
    /// A block rule matched.
    Block { rule: Arc<str>, list_id: i64 },
    /// An exception rule matched; suppresses block rules.
    Allow { rule: Arc<str>, list_id: i64 },
    /// A static rewrite or hosts rule supplies the answer directly.
    Rewrite(RewriteOutcome),
    /// A blocked-service bundle matched.
    BlockService { name: Arc<str>, rule: Arc<str> },
}

impl Decision {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Block { .. } | Self::BlockService { .. })
    }
}

/// Why a response looked the way it did, as recorded in the query log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterReason {
    NotFilteredNotFound,
    NotFilteredWhiteList,
    FilteredBlackList,
    FilteredBlockedService,
    FilteredSafeBrowsing,
    FilteredParental,
    FilteredSafeSearch,
    FilteredAccessBlocked,
    Rewritten,
}

impl FilterReason {
    pub fn is_filtered(self) -> bool {
        !matches!(
            self,
            Self::NotFilteredNotFound | Self::NotFilteredWhiteList
        )
    }
}
