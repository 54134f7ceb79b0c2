use serde::{Deserialize, Serialize};

/// Id of the synthetic "user rules" filter. Never persisted as a file.
pub const USER_FILTER_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Blocklist,
    Allowlist,
}

/// Metadata for one downloadable filter list.
///
/// The body lives on disk as `<data>/filters/<id>.txt`; `checksum` is the
/// CRC32 of those bytes and equals 0 until the first successful download
/// (`last_updated` = 0 in the same state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterList {
    pub id: i64,
    /// Remote URL or absolute local path.
    pub url: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub rule_count: u64,
    #[serde(default)]
    pub checksum: u32,
    /// Unix seconds; 0 means the body has never been loaded.
    #[serde(default)]
    pub last_updated: i64,
    pub kind: FilterKind,
}

impl FilterList {
    pub fn new(id: i64, url: impl Into<String>, name: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            id,
            url: url.into(),
            name: name.into(),
            enabled: true,
            rule_count: 0,
            checksum: 0,
            last_updated: 0,
            kind,
        }
    }

    /// File name of the on-disk body, derived from the id.
    pub fn body_file_name(&self) -> String {
        format!("{}.txt", self.id)
    }

    pub fn is_local_path(&self) -> bool {
        self.url.starts_with('/')
    }
}
