use super::registry::ClientRegistry;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;
use warden_dns_domain::{ClientSource, DomainError};

/// /etc/hosts scanner feeding the client registry with the
/// highest-priority auto-client source.
pub struct HostsFileScanner {
    path: String,
    registry: Arc<ClientRegistry>,
}

impl HostsFileScanner {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            path: "/etc/hosts".to_string(),
            registry,
        }
    }

    pub fn with_path(path: String, registry: Arc<ClientRegistry>) -> Self {
        Self { path, registry }
    }

    pub async fn scan(&self) -> Result<usize, DomainError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| DomainError::IoError(format!("reading {}: {e}", self.path)))?;

        let mut count = 0;
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(ip) = tokens.next().and_then(|t| t.parse::<IpAddr>().ok()) else {
                continue;
            };
            if ip.is_loopback() {
                continue;
            }
            if let Some(host) = tokens.next() {
                self.registry
                    .add_auto(ip, host, ClientSource::HostsFile);
                count += 1;
            }
        }

        debug!(entries = count, path = %self.path, "Hosts file scanned");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_dns_application::ports::EmptyLeaseTable;

    #[tokio::test]
    async fn test_scan_adds_auto_clients() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "127.0.0.1 localhost\n192.168.1.50 nas nas.lan # storage\n# comment\n",
        )
        .unwrap();

        let registry = Arc::new(ClientRegistry::new(vec![], Arc::new(EmptyLeaseTable)).unwrap());
        let scanner =
            HostsFileScanner::with_path(tmp.path().to_str().unwrap().into(), Arc::clone(&registry));
        assert_eq!(scanner.scan().await.unwrap(), 1);

        let auto = registry.find_auto("192.168.1.50".parse().unwrap()).unwrap();
        assert_eq!(auto.host, "nas");
        assert_eq!(auto.source, ClientSource::HostsFile);
    }
}
