use crate::blocking::BlockingMode;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Upstream dispatch and response-synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Upstream spec lines, `[/domain/]server` reservations included.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<String>,

    /// Plain resolvers used to resolve encrypted-upstream hostnames.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: Vec<IpAddr>,

    /// Per-upstream exchange timeout, seconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,

    /// Query every upstream in parallel and take the first answer.
    #[serde(default)]
    pub all_servers: bool,

    /// Per-client queries per second; 0 disables the limiter.
    #[serde(default = "default_ratelimit")]
    pub ratelimit: u32,

    /// Refuse ANY queries instead of forwarding them.
    #[serde(default = "default_true")]
    pub refuse_any: bool,

    /// Attach an EDNS Client Subnet option for public clients.
    #[serde(default)]
    pub edns_client_subnet: bool,

    /// CIDRs whose X-Forwarded-For headers are trusted on the DoH path.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    #[serde(default)]
    pub blocking_mode: BlockingMode,

    /// Answer addresses for `custom_ip` mode.
    #[serde(default)]
    pub blocking_ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    pub blocking_ipv6: Option<Ipv6Addr>,

    /// TTL for synthesized block responses, seconds.
    #[serde(default = "default_blocked_ttl")]
    pub blocked_response_ttl: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstreams: default_upstreams(),
            bootstrap: default_bootstrap(),
            upstream_timeout: default_upstream_timeout(),
            all_servers: false,
            ratelimit: default_ratelimit(),
            refuse_any: true,
            edns_client_subnet: false,
            trusted_proxies: vec![],
            blocking_mode: BlockingMode::default(),
            blocking_ipv4: None,
            blocking_ipv6: None,
            blocked_response_ttl: default_blocked_ttl(),
        }
    }
}

fn default_upstreams() -> Vec<String> {
    vec!["https://dns10.quad9.net/dns-query".to_string()]
}

fn default_bootstrap() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::new(9, 9, 9, 10)),
        IpAddr::V4(Ipv4Addr::new(149, 112, 112, 10)),
    ]
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_ratelimit() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

fn default_blocked_ttl() -> u32 {
    10
}
