use serde::{Deserialize, Serialize};

/// Raw access-list entries. Each client entry is an IP, a CIDR, a ClientID,
/// or a hostname glob; blocked hosts are exact names, suffixes, or `*.x`
/// wildcards. Compiled into an immutable snapshot by the infrastructure
/// layer on every reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_clients: Vec<String>,

    #[serde(default)]
    pub disallowed_clients: Vec<String>,

    #[serde(default)]
    pub blocked_hosts: Vec<String>,
}
