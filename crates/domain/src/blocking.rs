use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// How a blocked query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// A/AAAA get the unspecified address, everything else NXDOMAIN.
    #[default]
    Default,
    /// REFUSED rcode.
    Refused,
    /// NXDOMAIN rcode.
    Nxdomain,
    /// Always 0.0.0.0 / ::.
    NullIp,
    /// Operator-configured literal addresses.
    CustomIp,
}

impl BlockingMode {
    pub const NULL_IPV4: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
    pub const NULL_IPV6: Ipv6Addr = Ipv6Addr::UNSPECIFIED;
}
