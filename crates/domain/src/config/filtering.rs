use crate::filter_list::FilterList;
use crate::rewrite::Rewrite;
use serde::{Deserialize, Serialize};

/// Allowed filter refresh intervals, hours. 0 disables the refresher.
pub const REFRESH_INTERVALS_HOURS: [u32; 6] = [0, 1, 12, 24, 72, 168];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hours between refresh cycles; one of `REFRESH_INTERVALS_HOURS`.
    #[serde(default = "default_interval")]
    pub update_interval_hours: u32,

    /// Downloadable lists, blocklists and allowlists alike.
    #[serde(default)]
    pub filters: Vec<FilterList>,

    /// The synthetic id-0 filter, one rule per line.
    #[serde(default)]
    pub user_rules: Vec<String>,

    #[serde(default)]
    pub rewrites: Vec<Rewrite>,

    #[serde(default)]
    pub safe_search: bool,

    #[serde(default)]
    pub safe_browsing: bool,

    #[serde(default)]
    pub parental: bool,

    /// Globally blocked service names (see the service catalog).
    #[serde(default)]
    pub blocked_services: Vec<String>,

    /// Optional proxy for list downloads, e.g. `http://127.0.0.1:3128`.
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_hours: default_interval(),
            filters: vec![],
            user_rules: vec![],
            rewrites: vec![],
            safe_search: false,
            safe_browsing: false,
            parental: false,
            blocked_services: vec![],
            proxy_url: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    24
}
