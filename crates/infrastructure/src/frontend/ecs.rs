use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use std::net::IpAddr;

/// Source prefix lengths advertised upstream, per common ECS practice.
const V4_PREFIX: u8 = 24;
const V6_PREFIX: u8 = 56;

/// Attach an EDNS Client Subnet option carrying the (truncated) client
/// address. An ECS option already present in the query passes through
/// untouched.
pub fn add_client_subnet(message: &mut Message, client_ip: IpAddr) {
    let edns = message.extensions_mut().get_or_insert_with(Edns::new);
    if edns.options().get(EdnsCode::Subnet).is_some() {
        return;
    }

    let (family, prefix, addr_bytes): (u16, u8, Vec<u8>) = match client_ip {
        IpAddr::V4(v4) => {
            let keep = (V4_PREFIX as usize).div_ceil(8);
            (1, V4_PREFIX, v4.octets()[..keep].to_vec())
        }
        IpAddr::V6(v6) => {
            let keep = (V6_PREFIX as usize).div_ceil(8);
            (2, V6_PREFIX, v6.octets()[..keep].to_vec())
        }
    };

    let mut payload = Vec::with_capacity(4 + addr_bytes.len());
    payload.extend_from_slice(&family.to_be_bytes());
    payload.push(prefix);
    payload.push(0); // scope prefix, always 0 in queries
    payload.extend_from_slice(&addr_bytes);

    edns.options_mut()
        .insert(EdnsOption::Unknown(EdnsCode::Subnet.into(), payload));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_truncated_v4_subnet() {
        let mut msg = Message::new();
        add_client_subnet(&mut msg, "203.0.113.77".parse().unwrap());
        let edns = msg.extensions().as_ref().unwrap();
        match edns.options().get(EdnsCode::Subnet) {
            Some(EdnsOption::Unknown(_, bytes)) => {
                assert_eq!(&bytes[..4], &[0, 1, 24, 0]);
                // /24 keeps three octets; the host octet is gone
                assert_eq!(&bytes[4..], &[203, 0, 113]);
            }
            other => panic!("expected subnet option, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_option_passes_through() {
        let mut msg = Message::new();
        let edns = msg.extensions_mut().get_or_insert_with(Edns::new);
        edns.options_mut()
            .insert(EdnsOption::Unknown(EdnsCode::Subnet.into(), vec![9, 9]));

        add_client_subnet(&mut msg, "203.0.113.77".parse().unwrap());
        let edns = msg.extensions().as_ref().unwrap();
        match edns.options().get(EdnsCode::Subnet) {
            Some(EdnsOption::Unknown(_, bytes)) => assert_eq!(bytes, &vec![9u8, 9]),
            other => panic!("expected untouched option, got {other:?}"),
        }
    }
}
