use std::net::IpAddr;

/// Read side of the DHCP lease table. The DHCP server itself is an external
/// collaborator; the client registry only needs MAC → current lease IP to
/// resolve MAC-keyed client ids.
pub trait LeaseTable: Send + Sync {
    fn ip_for_mac(&self, mac: &str) -> Option<IpAddr>;
}

/// A lease table with nothing in it.
pub struct EmptyLeaseTable;

impl LeaseTable for EmptyLeaseTable {
    fn ip_for_mac(&self, _mac: &str) -> Option<IpAddr> {
        None
    }
}
