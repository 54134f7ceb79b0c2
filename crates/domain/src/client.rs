use crate::errors::DomainError;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// One identifier a manual client may be keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientId {
    Ip(IpAddr),
    Subnet(IpNetwork),
    Mac(String),
    /// Operator-assigned string carried in the DoH URL path or DoT SNI.
    ClientId(String),
}

impl ClientId {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        if let Ok(net) = s.parse::<IpNetwork>() {
            return Ok(Self::Subnet(net));
        }
        if is_mac(s) {
            return Ok(Self::Mac(s.to_ascii_lowercase()));
        }
        if is_client_id(s) {
            return Ok(Self::ClientId(s.to_ascii_lowercase()));
        }
        Err(DomainError::InvalidClient(format!("unrecognized id: {s}")))
    }
}

/// MAC address: 6 pairs of hex digits separated by `:` or `-`.
fn is_mac(s: &str) -> bool {
    if s.len() != 17 {
        return false;
    }
    let sep = if s.contains(':') {
        ':'
    } else if s.contains('-') {
        '-'
    } else {
        return false;
    };
    let parts: Vec<&str> = s.split(sep).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// ClientIDs are DNS-label-safe: letters, digits, hyphens.
fn is_client_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// A manually configured client with its own filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    /// Raw id strings as configured (IPs, CIDRs, MACs, ClientIDs).
    pub ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub use_own_settings: bool,
    #[serde(default = "default_true")]
    pub filtering_enabled: bool,
    #[serde(default)]
    pub safebrowsing_enabled: bool,
    #[serde(default)]
    pub parental_enabled: bool,
    #[serde(default)]
    pub safesearch_enabled: bool,
    #[serde(default)]
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub use_own_blocked_services: bool,
    #[serde(default)]
    pub blocked_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois_info: Option<WhoisInfo>,
}

fn default_true() -> bool {
    true
}

impl Client {
    pub fn parsed_ids(&self) -> Result<Vec<ClientId>, DomainError> {
        self.ids.iter().map(|s| ClientId::parse(s)).collect()
    }

    pub fn tag_arcs(&self) -> Vec<Arc<str>> {
        self.tags.iter().map(|t| Arc::from(t.as_str())).collect()
    }
}

/// Where an auto-discovered host name came from. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClientSource {
    Whois = 1,
    Rdns = 2,
    Arp = 3,
    Dhcp = 4,
    HostsFile = 5,
}

/// A host observed on the network but not configured by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoClient {
    pub ip: IpAddr,
    pub host: String,
    pub source: ClientSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois_info: Option<WhoisInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orgname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl WhoisInfo {
    pub fn is_empty(&self) -> bool {
        self.orgname.is_none() && self.country.is_none() && self.city.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_id() {
        assert!(matches!(
            ClientId::parse("192.0.2.1").unwrap(),
            ClientId::Ip(_)
        ));
    }

    #[test]
    fn test_parse_cidr_id() {
        assert!(matches!(
            ClientId::parse("10.0.0.0/8").unwrap(),
            ClientId::Subnet(_)
        ));
    }

    #[test]
    fn test_parse_mac_id_normalizes_case() {
        let id = ClientId::parse("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(id, ClientId::Mac("aa:bb:cc:dd:ee:ff".into()));
    }

    #[test]
    fn test_parse_client_id() {
        let id = ClientId::parse("kids-tablet").unwrap();
        assert_eq!(id, ClientId::ClientId("kids-tablet".into()));
    }

    #[test]
    fn test_reject_garbage_id() {
        assert!(ClientId::parse("not a client!").is_err());
    }

    #[test]
    fn test_source_priority_ordering() {
        assert!(ClientSource::HostsFile > ClientSource::Dhcp);
        assert!(ClientSource::Dhcp > ClientSource::Arp);
        assert!(ClientSource::Arp > ClientSource::Rdns);
        assert!(ClientSource::Rdns > ClientSource::Whois);
    }
}
