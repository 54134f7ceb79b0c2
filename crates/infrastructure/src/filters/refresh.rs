use crc32fast::Hasher;
use futures::StreamExt;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use warden_dns_domain::{DomainError, FilterList};

/// How much of the head of a download is sniffed for HTML.
const SNIFF_WINDOW: usize = 4096;

#[derive(Debug)]
pub enum RefreshOutcome {
    /// Body checksum matches the stored one; only `last_updated` moves.
    Unchanged,
    Updated {
        checksum: u32,
        rule_count: u64,
        /// `! Title:` header value, first occurrence.
        title: Option<String>,
    },
}

/// Download (or read) one list body and atomically replace `<id>.txt`.
///
/// The body streams into `<id>.txt.tmp` while the CRC32 accumulates; if the
/// final checksum equals the stored one the temp file is discarded and the
/// previous body stays in place untouched.
pub async fn refresh_list(
    http: &reqwest::Client,
    dir: &Path,
    list: &FilterList,
) -> Result<RefreshOutcome, DomainError> {
    let tmp_path = dir.join(format!("{}.txt.tmp", list.id));
    let final_path = dir.join(list.body_file_name());

    let result = if list.is_local_path() {
        write_from_file(&list.url, &tmp_path).await
    } else {
        write_from_url(http, &list.url, &tmp_path).await
    };

    let checksum = match result {
        Ok(v) => v,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    if checksum == list.checksum && list.checksum != 0 {
        let _ = fs::remove_file(&tmp_path).await;
        debug!(id = list.id, "Filter body unchanged");
        return Ok(RefreshOutcome::Unchanged);
    }

    // Full parse happens on the temp file so the live body is never half-read.
    let text = fs::read_to_string(&tmp_path)
        .await
        .map_err(|e| DomainError::IoError(format!("reading {}: {e}", tmp_path.display())))?;
    let title = parse_title(&text);
    let rule_count = count_rules(&text);

    fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|e| DomainError::IoError(format!("renaming {}: {e}", final_path.display())))?;

    Ok(RefreshOutcome::Updated {
        checksum,
        rule_count,
        title,
    })
}

async fn write_from_url(
    http: &reqwest::Client,
    url: &str,
    tmp_path: &Path,
) -> Result<u32, DomainError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| DomainError::FilterList(format!("fetch {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(DomainError::FilterList(format!(
            "HTTP {} for {url}",
            response.status().as_u16()
        )));
    }

    let mut file = fs::File::create(tmp_path)
        .await
        .map_err(|e| DomainError::IoError(format!("creating {}: {e}", tmp_path.display())))?;

    let mut hasher = Hasher::new();
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_WINDOW);
    let mut sniffed = false;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DomainError::FilterList(format!("read {url}: {e}")))?;

        if !sniffed {
            let take = SNIFF_WINDOW.saturating_sub(head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if head.len() >= SNIFF_WINDOW {
                reject_html(&head)?;
                sniffed = true;
            }
        }

        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| DomainError::IoError(format!("writing {}: {e}", tmp_path.display())))?;
    }

    if !sniffed {
        reject_html(&head)?;
    }

    file.flush()
        .await
        .map_err(|e| DomainError::IoError(format!("flushing {}: {e}", tmp_path.display())))?;

    Ok(hasher.finalize())
}

async fn write_from_file(path: &str, tmp_path: &Path) -> Result<u32, DomainError> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| DomainError::IoError(format!("reading {path}: {e}")))?;

    reject_html(&bytes[..bytes.len().min(SNIFF_WINDOW)])?;

    let mut hasher = Hasher::new();
    hasher.update(&bytes);

    fs::write(tmp_path, &bytes)
        .await
        .map_err(|e| DomainError::IoError(format!("writing {}: {e}", tmp_path.display())))?;

    Ok(hasher.finalize())
}

/// A filter body must be text, not an error page served with 200.
fn reject_html(head: &[u8]) -> Result<(), DomainError> {
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    if text.contains("<html") || text.contains("<!doctype") {
        return Err(DomainError::DataIsHtml);
    }
    Ok(())
}

fn parse_title(text: &str) -> Option<String> {
    for line in text.lines().take(64) {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("! Title:") {
            let title = rest.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

fn count_rules(text: &str) -> u64 {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('!') && !l.starts_with('#'))
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_dns_domain::FilterKind;

    #[test]
    fn test_reject_html_doctype() {
        assert!(matches!(
            reject_html(b"<!DOCTYPE html><html><head>"),
            Err(DomainError::DataIsHtml)
        ));
    }

    #[test]
    fn test_reject_html_tag_mid_buffer() {
        let mut head = b"! Title: x\n".to_vec();
        head.extend_from_slice(b"<HTML>");
        assert!(reject_html(&head).is_err());
    }

    #[test]
    fn test_plain_rules_pass_sniff() {
        assert!(reject_html(b"||ads.example.com^\n0.0.0.0 tracker.net\n").is_ok());
    }

    #[test]
    fn test_parse_title_first_occurrence() {
        let text = "! Homepage: x\n! Title: My List\n! Title: Other\n||a.com^";
        assert_eq!(parse_title(text).as_deref(), Some("My List"));
    }

    #[test]
    fn test_count_rules_skips_comments() {
        let text = "! c\n# c\n\n||a.com^\n0.0.0.0 b.com\n";
        assert_eq!(count_rules(text), 2);
    }

    #[tokio::test]
    async fn test_local_file_refresh_updates_body() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        std::fs::write(&src, "! Title: Local\n||ads.example.com^\n").unwrap();

        let list = FilterList::new(3, src.to_str().unwrap(), "", FilterKind::Blocklist);
        let http = reqwest::Client::new();
        let outcome = refresh_list(&http, tmp.path(), &list).await.unwrap();

        match outcome {
            RefreshOutcome::Updated {
                rule_count, title, ..
            } => {
                assert_eq!(rule_count, 1);
                assert_eq!(title.as_deref(), Some("Local"));
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert!(tmp.path().join("3.txt").exists());
        assert!(!tmp.path().join("3.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_unchanged_checksum_skips_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let body = "||ads.example.com^\n";
        std::fs::write(&src, body).unwrap();

        let mut list = FilterList::new(4, src.to_str().unwrap(), "x", FilterKind::Blocklist);
        let http = reqwest::Client::new();

        // First pass downloads, second sees the same checksum.
        match refresh_list(&http, tmp.path(), &list).await.unwrap() {
            RefreshOutcome::Updated { checksum, .. } => {
                list.checksum = checksum;
                list.last_updated = 1;
            }
            other => panic!("expected update, got {other:?}"),
        }
        let before = std::fs::metadata(tmp.path().join("4.txt")).unwrap().modified().unwrap();
        match refresh_list(&http, tmp.path(), &list).await.unwrap() {
            RefreshOutcome::Unchanged => {}
            other => panic!("expected unchanged, got {other:?}"),
        }
        let after = std::fs::metadata(tmp.path().join("4.txt")).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert!(!tmp.path().join("4.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_html_local_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        std::fs::write(&src, "<!DOCTYPE html>\n<html><body>error</body></html>").unwrap();

        let list = FilterList::new(5, src.to_str().unwrap(), "x", FilterKind::Blocklist);
        let http = reqwest::Client::new();
        assert!(matches!(
            refresh_list(&http, tmp.path(), &list).await,
            Err(DomainError::DataIsHtml)
        ));
        assert!(!tmp.path().join("5.txt.tmp").exists());
    }
}
