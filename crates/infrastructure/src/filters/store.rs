use super::refresh::{refresh_list, RefreshOutcome};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use warden_dns_domain::{DomainError, FilterKind, FilterList, USER_FILTER_ID};

/// Which list kinds a refresh cycle touches.
#[derive(Debug, Clone, Copy)]
pub struct KindMask {
    pub blocklists: bool,
    pub allowlists: bool,
}

impl KindMask {
    pub fn all() -> Self {
        Self {
            blocklists: true,
            allowlists: true,
        }
    }

    pub fn covers(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Blocklist => self.blocklists,
            FilterKind::Allowlist => self.allowlists,
        }
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RefreshSummary {
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.updated == 0 && self.unchanged == 0
    }
}

/// Owns the on-disk cache of downloaded filter lists and their metadata.
///
/// Bodies live as `<dir>/<id>.txt`; the synthetic user filter (id 0) exists
/// only in memory and in the config file. Metadata mutations are handed back
/// to the caller for persistence into the config.
pub struct FilterStore {
    dir: PathBuf,
    state: Mutex<StoreState>,
    http: reqwest::Client,
    /// At most one refresh cycle at a time.
    refresh_gate: tokio::sync::Mutex<()>,
}

struct StoreState {
    lists: Vec<FilterList>,
    user_rules: Vec<String>,
}

impl FilterStore {
    pub fn new(
        dir: PathBuf,
        lists: Vec<FilterList>,
        user_rules: Vec<String>,
        proxy_url: Option<&str>,
    ) -> Result<Self, DomainError> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| DomainError::IoError(format!("creating {}: {e}", dir.display())))?;

        let mut builder = reqwest::Client::builder()
            .user_agent("warden-dns/0.3 (filter-refresh)")
            .timeout(std::time::Duration::from_secs(60));
        if let Some(url) = proxy_url {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| DomainError::FilterList(format!("bad proxy url {url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| DomainError::FilterList(format!("http client: {e}")))?;

        Ok(Self {
            dir,
            state: Mutex::new(StoreState { lists, user_rules }),
            http,
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn lists(&self) -> Vec<FilterList> {
        self.state.lock().unwrap().lists.clone()
    }

    pub fn user_rules(&self) -> Vec<String> {
        self.state.lock().unwrap().user_rules.clone()
    }

    /// Add a list. Fails when the URL is already present in either kind.
    pub fn list_add(
        &self,
        url: &str,
        name: &str,
        kind: FilterKind,
    ) -> Result<FilterList, DomainError> {
        let mut state = self.state.lock().unwrap();
        if state.lists.iter().any(|l| l.url == url) {
            return Err(DomainError::FilterList(format!(
                "filter URL already exists: {url}"
            )));
        }
        let id = state.lists.iter().map(|l| l.id).max().unwrap_or(USER_FILTER_ID) + 1;
        let list = FilterList::new(id, url, name, kind);
        state.lists.push(list.clone());
        info!(id, url, "Filter list added");
        Ok(list)
    }

    /// Remove a list by URL. The body is renamed `<id>.txt.old` and left for
    /// the operator; readers holding the old descriptor are unaffected.
    pub fn list_remove(&self, url: &str) -> Result<FilterList, DomainError> {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .lists
            .iter()
            .position(|l| l.url == url)
            .ok_or_else(|| DomainError::NotFound(format!("filter URL: {url}")))?;
        let list = state.lists.remove(idx);
        drop(state);

        let body = self.dir.join(list.body_file_name());
        if body.exists() {
            let old = self.dir.join(format!("{}.txt.old", list.id));
            if let Err(e) = std::fs::rename(&body, &old) {
                warn!(id = list.id, error = %e, "Failed to rename removed list body");
            }
        }
        info!(id = list.id, url, "Filter list removed");
        Ok(list)
    }

    /// Rename, toggle, or re-point a list. A URL change resets the checksum
    /// so the next refresh re-downloads.
    pub fn list_set_properties(
        &self,
        url: &str,
        new_url: &str,
        new_name: &str,
        enabled: bool,
    ) -> Result<FilterList, DomainError> {
        let mut state = self.state.lock().unwrap();
        if url != new_url && state.lists.iter().any(|l| l.url == new_url) {
            return Err(DomainError::FilterList(format!(
                "filter URL already exists: {new_url}"
            )));
        }
        let list = state
            .lists
            .iter_mut()
            .find(|l| l.url == url)
            .ok_or_else(|| DomainError::NotFound(format!("filter URL: {url}")))?;
        list.name = new_name.to_string();
        list.enabled = enabled;
        if url != new_url {
            list.url = new_url.to_string();
            list.checksum = 0;
            list.last_updated = 0;
            list.rule_count = 0;
        }
        Ok(list.clone())
    }

    /// Replace the synthetic user filter (id 0).
    pub fn user_rules_set(&self, lines: Vec<String>) {
        let mut state = self.state.lock().unwrap();
        state.user_rules = lines;
    }

    /// Walk enabled lists of the masked kinds and refresh those that are due
    /// (`last_updated + interval < now`) or all of them when forced.
    ///
    /// Only one cycle runs at a time; `important` waits for the gate, a
    /// plain call fails with `RefreshAlreadyRunning`.
    pub async fn refresh(
        &self,
        mask: KindMask,
        force: bool,
        important: bool,
        interval_hours: u32,
    ) -> Result<RefreshSummary, DomainError> {
        let _gate = if important {
            self.refresh_gate.lock().await
        } else {
            self.refresh_gate
                .try_lock()
                .map_err(|_| DomainError::RefreshAlreadyRunning)?
        };

        let now = unix_now();
        let due: Vec<FilterList> = {
            let state = self.state.lock().unwrap();
            state
                .lists
                .iter()
                .filter(|l| l.enabled && mask.covers(l.kind))
                .filter(|l| {
                    force
                        || interval_hours == 0
                        || l.last_updated + (interval_hours as i64) * 3600 < now
                })
                .cloned()
                .collect()
        };

        let mut summary = RefreshSummary::default();
        for list in due {
            match refresh_list(&self.http, &self.dir, &list).await {
                Ok(RefreshOutcome::Unchanged) => {
                    summary.unchanged += 1;
                    self.update_meta(list.id, |l| l.last_updated = unix_now());
                }
                Ok(RefreshOutcome::Updated {
                    checksum,
                    rule_count,
                    title,
                }) => {
                    summary.updated += 1;
                    self.update_meta(list.id, |l| {
                        l.checksum = checksum;
                        l.rule_count = rule_count;
                        l.last_updated = unix_now();
                        if let Some(title) = &title {
                            if l.name.is_empty() {
                                l.name = title.clone();
                            }
                        }
                    });
                    info!(id = list.id, rules = rule_count, "Filter list updated");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(id = list.id, url = %list.url, error = %e, "Filter refresh failed");
                }
            }
        }

        Ok(summary)
    }

    fn update_meta(&self, id: i64, apply: impl FnOnce(&mut FilterList)) {
        let mut state = self.state.lock().unwrap();
        if let Some(list) = state.lists.iter_mut().find(|l| l.id == id) {
            apply(list);
        }
    }

    /// Read one enabled list body, degrading an unreadable file to empty.
    pub fn read_body(&self, list: &FilterList) -> String {
        let path = self.dir.join(list.body_file_name());
        match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                if list.last_updated != 0 {
                    warn!(id = list.id, error = %e, "Unreadable list body; treating as empty");
                }
                String::new()
            }
        }
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path) -> FilterStore {
        FilterStore::new(dir.to_path_buf(), vec![], vec![], None).unwrap()
    }

    #[test]
    fn test_add_assigns_next_id() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let a = s.list_add("https://example.org/a.txt", "a", FilterKind::Blocklist).unwrap();
        let b = s.list_add("https://example.org/b.txt", "b", FilterKind::Allowlist).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_add_rejects_duplicate_url_across_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        s.list_add("https://example.org/a.txt", "a", FilterKind::Blocklist).unwrap();
        assert!(s
            .list_add("https://example.org/a.txt", "b", FilterKind::Allowlist)
            .is_err());
    }

    #[test]
    fn test_remove_renames_body_to_old() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let list = s.list_add("https://example.org/a.txt", "a", FilterKind::Blocklist).unwrap();
        std::fs::write(tmp.path().join(list.body_file_name()), "||x.com^").unwrap();

        s.list_remove("https://example.org/a.txt").unwrap();
        assert!(!tmp.path().join("1.txt").exists());
        assert!(tmp.path().join("1.txt.old").exists());
    }

    #[test]
    fn test_set_url_resets_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        s.list_add("https://example.org/a.txt", "a", FilterKind::Blocklist).unwrap();
        let updated = s
            .list_set_properties(
                "https://example.org/a.txt",
                "https://example.org/other.txt",
                "a",
                true,
            )
            .unwrap();
        assert_eq!(updated.checksum, 0);
        assert_eq!(updated.last_updated, 0);
    }

    #[test]
    fn test_unreadable_body_degrades_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let list = FilterList::new(9, "https://example.org/gone.txt", "gone", FilterKind::Blocklist);
        assert_eq!(s.read_body(&list), "");
    }
}
