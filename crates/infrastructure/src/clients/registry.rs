use ipnetwork::IpNetwork;
use rustc_hash::FxHashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tracing::debug;
use warden_dns_application::ports::LeaseTable;
use warden_dns_domain::{AutoClient, Client, ClientId, ClientSource, DomainError, WhoisInfo};

/// Manual client plus its parsed ids, kept together so `find` never
/// re-parses on the hot path.
struct ManualEntry {
    client: Arc<Client>,
    ids: Vec<ClientId>,
}

struct RegistryInner {
    by_name: FxHashMap<String, usize>,
    manual: Vec<ManualEntry>,
    auto: FxHashMap<IpAddr, AutoClient>,
}

/// Dual-indexed client registry: manual clients by name and by id, plus
/// auto-discovered hosts by IP.
///
/// A single mutex guards both indices. Hot-path readers snapshot the
/// matched client (`Arc` clone) and release immediately.
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
    leases: Arc<dyn LeaseTable>,
}

impl ClientRegistry {
    pub fn new(clients: Vec<Client>, leases: Arc<dyn LeaseTable>) -> Result<Self, DomainError> {
        let mut inner = RegistryInner {
            by_name: FxHashMap::default(),
            manual: Vec::new(),
            auto: FxHashMap::default(),
        };
        for client in clients {
            Self::insert_manual(&mut inner, client)?;
        }
        Ok(Self {
            inner: Mutex::new(inner),
            leases,
        })
    }

    fn insert_manual(inner: &mut RegistryInner, client: Client) -> Result<(), DomainError> {
        if inner.by_name.contains_key(&client.name) {
            return Err(DomainError::InvalidClient(format!(
                "duplicate client name: {}",
                client.name
            )));
        }
        let ids = client.parsed_ids()?;
        let mut client = client;

        // Promotion: an IP id takes over the AutoClient's WHOIS metadata.
        for id in &ids {
            if let ClientId::Ip(ip) = id {
                if let Some(auto) = inner.auto.remove(ip) {
                    if client.whois_info.is_none() {
                        client.whois_info = auto.whois_info;
                    }
                }
            }
        }

        let index = inner.manual.len();
        inner.by_name.insert(client.name.clone(), index);
        inner.manual.push(ManualEntry {
            client: Arc::new(client),
            ids,
        });
        Ok(())
    }

    /// Find the manual client covering `ip` (directly, via CIDR, or via a
    /// MAC id resolved through the current DHCP lease table) or matching
    /// `client_id`.
    pub fn find(&self, ip: IpAddr, client_id: Option<&str>) -> Option<Arc<Client>> {
        let inner = self.inner.lock().unwrap();
        for entry in &inner.manual {
            for id in &entry.ids {
                let matched = match id {
                    ClientId::Ip(rule_ip) => *rule_ip == ip,
                    ClientId::Subnet(net) => net.contains(ip),
                    ClientId::Mac(mac) => self.leases.ip_for_mac(mac) == Some(ip),
                    ClientId::ClientId(cid) => {
                        client_id.map(|c| c.eq_ignore_ascii_case(cid)).unwrap_or(false)
                    }
                };
                if matched {
                    return Some(Arc::clone(&entry.client));
                }
            }
        }
        None
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Client>> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_name
            .get(name)
            .map(|&i| Arc::clone(&inner.manual[i].client))
    }

    pub fn list_manual(&self) -> Vec<Arc<Client>> {
        let inner = self.inner.lock().unwrap();
        inner.manual.iter().map(|e| Arc::clone(&e.client)).collect()
    }

    pub fn list_auto(&self) -> Vec<AutoClient> {
        let inner = self.inner.lock().unwrap();
        inner.auto.values().cloned().collect()
    }

    pub fn find_auto(&self, ip: IpAddr) -> Option<AutoClient> {
        let inner = self.inner.lock().unwrap();
        inner.auto.get(&ip).cloned()
    }

    /// Replace the whole manual set (control-plane update path).
    pub fn replace_manual(&self, clients: Vec<Client>) -> Result<(), DomainError> {
        let mut staged = RegistryInner {
            by_name: FxHashMap::default(),
            manual: Vec::new(),
            auto: FxHashMap::default(),
        };
        {
            let inner = self.inner.lock().unwrap();
            staged.auto = inner.auto.clone();
        }
        for client in clients {
            Self::insert_manual(&mut staged, client)?;
        }
        let mut inner = self.inner.lock().unwrap();
        *inner = staged;
        Ok(())
    }

    /// Record an auto-discovered host. A higher-or-equal priority source
    /// overwrites; a manual client for the same IP hides the entry, so it
    /// is not stored at all.
    pub fn add_auto(&self, ip: IpAddr, host: &str, source: ClientSource) {
        let mut inner = self.inner.lock().unwrap();

        let manual_covers = inner.manual.iter().any(|e| {
            e.ids.iter().any(|id| match id {
                ClientId::Ip(rule_ip) => *rule_ip == ip,
                ClientId::Subnet(net) => net.contains(ip),
                _ => false,
            })
        });
        if manual_covers {
            return;
        }

        match inner.auto.get_mut(&ip) {
            Some(existing) => {
                if source >= existing.source {
                    existing.host = host.to_string();
                    existing.source = source;
                }
            }
            None => {
                debug!(ip = %ip, host, source = ?source, "Auto client discovered");
                inner.auto.insert(
                    ip,
                    AutoClient {
                        ip,
                        host: host.to_string(),
                        source,
                        whois_info: None,
                    },
                );
            }
        }
    }

    /// Attach WHOIS metadata to the auto client for `ip`, creating a
    /// WHOIS-sourced entry when none exists yet.
    pub fn set_whois_info(&self, ip: IpAddr, info: WhoisInfo) {
        if info.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.auto.get_mut(&ip) {
            Some(auto) => auto.whois_info = Some(info),
            None => {
                inner.auto.insert(
                    ip,
                    AutoClient {
                        ip,
                        host: String::new(),
                        source: ClientSource::Whois,
                        whois_info: Some(info),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_dns_application::ports::EmptyLeaseTable;

    fn client(name: &str, ids: &[&str]) -> Client {
        Client {
            name: name.into(),
            ids: ids.iter().map(|s| s.to_string()).collect(),
            tags: vec![],
            use_own_settings: false,
            filtering_enabled: true,
            safebrowsing_enabled: false,
            parental_enabled: false,
            safesearch_enabled: false,
            upstreams: vec![],
            use_own_blocked_services: false,
            blocked_services: vec![],
            whois_info: None,
        }
    }

    fn registry(clients: Vec<Client>) -> ClientRegistry {
        ClientRegistry::new(clients, Arc::new(EmptyLeaseTable)).unwrap()
    }

    struct OneLeaseTable;
    impl LeaseTable for OneLeaseTable {
        fn ip_for_mac(&self, mac: &str) -> Option<IpAddr> {
            (mac == "aa:bb:cc:dd:ee:ff").then(|| "192.0.2.10".parse().unwrap())
        }
    }

    #[test]
    fn test_find_by_ip() {
        let r = registry(vec![client("desk", &["192.0.2.5"])]);
        assert_eq!(
            r.find("192.0.2.5".parse().unwrap(), None).unwrap().name,
            "desk"
        );
        assert!(r.find("192.0.2.6".parse().unwrap(), None).is_none());
    }

    #[test]
    fn test_find_by_cidr() {
        let r = registry(vec![client("lan", &["10.0.0.0/24"])]);
        assert!(r.find("10.0.0.77".parse().unwrap(), None).is_some());
        assert!(r.find("10.0.1.77".parse().unwrap(), None).is_none());
    }

    #[test]
    fn test_find_by_mac_through_lease() {
        let r = ClientRegistry::new(
            vec![client("laptop", &["AA:BB:CC:DD:EE:FF"])],
            Arc::new(OneLeaseTable),
        )
        .unwrap();
        assert_eq!(
            r.find("192.0.2.10".parse().unwrap(), None).unwrap().name,
            "laptop"
        );
    }

    #[test]
    fn test_find_by_client_id() {
        let r = registry(vec![client("tablet", &["kids-tablet"])]);
        assert!(r
            .find("198.51.100.1".parse().unwrap(), Some("kids-tablet"))
            .is_some());
        assert!(r.find("198.51.100.1".parse().unwrap(), None).is_none());
    }

    #[test]
    fn test_auto_priority_upgrade_only() {
        let r = registry(vec![]);
        let ip: IpAddr = "192.0.2.40".parse().unwrap();
        r.add_auto(ip, "a", ClientSource::Arp);
        r.add_auto(ip, "b", ClientSource::Rdns);
        assert_eq!(r.find_auto(ip).unwrap().host, "a");
        r.add_auto(ip, "c", ClientSource::HostsFile);
        assert_eq!(r.find_auto(ip).unwrap().host, "c");
    }

    #[test]
    fn test_manual_client_hides_auto() {
        let r = registry(vec![client("desk", &["192.0.2.5"])]);
        r.add_auto("192.0.2.5".parse().unwrap(), "ghost", ClientSource::Rdns);
        assert!(r.find_auto("192.0.2.5".parse().unwrap()).is_none());
    }

    #[test]
    fn test_promotion_moves_whois_info() {
        let r = registry(vec![]);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        r.add_auto(ip, "roamer", ClientSource::Rdns);
        r.set_whois_info(
            ip,
            WhoisInfo {
                orgname: Some("Example Net".into()),
                country: Some("NL".into()),
                city: None,
            },
        );

        r.replace_manual(vec![client("roamer", &["203.0.113.9"])]).unwrap();
        assert!(r.find_auto(ip).is_none());
        let promoted = r.get_by_name("roamer").unwrap();
        assert_eq!(
            promoted.whois_info.as_ref().unwrap().orgname.as_deref(),
            Some("Example Net")
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let r = registry(vec![client("a", &["192.0.2.1"])]);
        assert!(r
            .replace_manual(vec![client("x", &["192.0.2.2"]), client("x", &["192.0.2.3"])])
            .is_err());
    }
}
