pub mod rdns;
pub mod whois;

pub use rdns::RdnsEnricher;
pub use whois::WhoisEnricher;

use std::net::IpAddr;

/// Built-in non-public ranges: RFC 1918, CGNAT 100.64/10, link-local,
/// loopback, multicast, documentation nets, and IPv6 ULA/link-local.
/// WHOIS has nothing useful to say about any of these.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // documentation: 192.0.2/24, 198.51.100/24, 203.0.113/24
                || (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
                || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
                || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
                // benchmarking 198.18.0.0/15
                || (octets[0] == 198 && (octets[1] & 0xfe) == 18))
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            !(v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                // ULA fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // link-local fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
                // documentation 2001:db8::/32
                || (segments[0] == 0x2001 && segments[1] == 0x0db8))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_private_ranges_not_public() {
        for addr in [
            "10.0.0.1",
            "172.16.5.5",
            "192.168.1.1",
            "100.64.0.1",
            "127.0.0.1",
            "169.254.1.1",
            "224.0.0.1",
            "192.0.2.1",
            "198.51.100.7",
            "203.0.113.200",
            "198.18.0.1",
            "fe80::1",
            "fd00::1",
            "::1",
            "2001:db8::1",
        ] {
            assert!(!is_public_ip(ip(addr)), "{addr} should be non-public");
        }
    }

    #[test]
    fn test_public_addresses() {
        for addr in ["8.8.8.8", "1.1.1.1", "185.60.216.35", "2606:4700::1111"] {
            assert!(is_public_ip(ip(addr)), "{addr} should be public");
        }
    }
}
