use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, warn};
use warden_dns_application::ports::LeaseTable;
use warden_dns_domain::DomainError;

/// Validate MAC address format: 6 pairs of hex digits separated by `:` or `-`.
fn is_valid_mac(mac: &str) -> bool {
    if mac.len() != 17 {
        return false;
    }
    let separator = if mac.contains(':') {
        ':'
    } else if mac.contains('-') {
        '-'
    } else {
        return false;
    };
    let parts: Vec<&str> = mac.split(separator).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Linux ARP cache scanner (reads /proc/net/arp).
///
/// Doubles as the default DHCP lease source: the MAC → IP map it maintains
/// is what resolves MAC-keyed client ids when no DHCP server feeds the
/// registry.
pub struct ArpScanner {
    arp_path: String,
    table: Mutex<HashMap<String, IpAddr>>,
}

impl ArpScanner {
    pub fn new() -> Self {
        Self {
            arp_path: "/proc/net/arp".to_string(),
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Custom ARP file path, for tests.
    pub fn with_path(path: String) -> Self {
        Self {
            arp_path: path,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Re-read the ARP cache and swap the MAC table.
    pub async fn scan(&self) -> Result<usize, DomainError> {
        let content = fs::read_to_string(&self.arp_path)
            .await
            .map_err(|e| DomainError::IoError(format!("reading ARP cache: {e}")))?;

        let mut table = HashMap::new();

        // Format of /proc/net/arp:
        // IP address       HW type     Flags       HW address            Mask     Device
        // 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
        for (line_num, line) in content.lines().enumerate() {
            if line_num == 0 {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            let ip_str = fields[0];
            let flags = fields[2];
            let mac = fields[3];

            // 0x2 = COMPLETE; incomplete entries carry an all-zero MAC.
            if flags != "0x2" || mac == "00:00:00:00:00:00" {
                continue;
            }
            if !is_valid_mac(mac) {
                warn!(ip = ip_str, mac, "Invalid MAC address format in ARP table");
                continue;
            }
            match IpAddr::from_str(ip_str) {
                Ok(ip) => {
                    table.insert(mac.to_ascii_lowercase(), ip);
                }
                Err(e) => {
                    warn!(error = %e, ip = ip_str, "Invalid IP in ARP table");
                }
            }
        }

        let count = table.len();
        *self.table.lock().unwrap() = table;
        debug!(entries = count, "ARP table scanned");
        Ok(count)
    }
}

impl Default for ArpScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseTable for ArpScanner {
    fn ip_for_mac(&self, mac: &str) -> Option<IpAddr> {
        self.table
            .lock()
            .unwrap()
            .get(&mac.to_ascii_lowercase())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_parses_complete_entries() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "IP address       HW type     Flags       HW address            Mask     Device\n\
             192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0\n\
             192.168.1.2      0x1         0x0         00:00:00:00:00:00     *        eth0\n",
        )
        .unwrap();

        let scanner = ArpScanner::with_path(tmp.path().to_str().unwrap().to_string());
        assert_eq!(scanner.scan().await.unwrap(), 1);
        assert_eq!(
            scanner.ip_for_mac("AA:BB:CC:DD:EE:FF"),
            Some("192.168.1.1".parse().unwrap())
        );
        assert!(scanner.ip_for_mac("11:22:33:44:55:66").is_none());
    }

    #[test]
    fn test_mac_validation() {
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
        assert!(is_valid_mac("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_mac("aa:bb:cc:dd:ee"));
        assert!(!is_valid_mac("zz:bb:cc:dd:ee:ff"));
    }
}
