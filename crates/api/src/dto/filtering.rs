use serde::{Deserialize, Serialize};
use warden_dns_domain::{FilterKind, FilterList};

#[derive(Debug, Serialize)]
pub struct FilteringStatusResponse {
    pub enabled: bool,
    pub interval: u32,
    pub filters: Vec<FilterEntry>,
    pub whitelist_filters: Vec<FilterEntry>,
    pub user_rules: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FilterEntry {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub enabled: bool,
    pub rules_count: u64,
    pub last_updated: i64,
}

impl From<&FilterList> for FilterEntry {
    fn from(list: &FilterList) -> Self {
        Self {
            id: list.id,
            url: list.url.clone(),
            name: list.name.clone(),
            enabled: list.enabled,
            rules_count: list.rule_count,
            last_updated: list.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FilteringConfigRequest {
    pub enabled: bool,
    pub interval: u32,
}

#[derive(Debug, Deserialize)]
pub struct AddUrlRequest {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub whitelist: bool,
}

impl AddUrlRequest {
    pub fn kind(&self) -> FilterKind {
        if self.whitelist {
            FilterKind::Allowlist
        } else {
            FilterKind::Blocklist
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveUrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SetUrlRequest {
    pub url: String,
    pub data: SetUrlData,
}

#[derive(Debug, Deserialize)]
pub struct SetUrlData {
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub whitelist: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub updated: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetRulesRequest {
    pub rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckHostQuery {
    pub name: String,
    #[serde(default)]
    pub qtype: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckHostResponse {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RewriteEntry {
    pub domain: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct BlockedServicesRequest {
    pub ids: Vec<String>,
}
