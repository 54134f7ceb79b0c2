use crate::errors::DomainError;
use crate::upstream::UpstreamSpec;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::net::IpAddr;

const STAMP_DNSCRYPT: u8 = 0x01;
const STAMP_DOH: u8 = 0x02;
const STAMP_DOT: u8 = 0x03;
const STAMP_DOQ: u8 = 0x04;

/// Decode an `sdns://` DNS stamp into an upstream spec. DNSCrypt stamps are
/// not supported and fail the config reload like any other invalid spec.
/// An address pinned in the stamp lands in `pinned` so the dialer can skip
/// bootstrap resolution.
pub fn decode_stamp(stamp: &str) -> Result<UpstreamSpec, DomainError> {
    let encoded = stamp
        .strip_prefix("sdns://")
        .ok_or_else(|| DomainError::InvalidUpstream(format!("not a stamp: {stamp}")))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| DomainError::InvalidUpstream(format!("bad stamp encoding: {e}")))?;

    let mut cursor = Cursor::new(&bytes);
    let kind = cursor.u8()?;

    let mut spec = match kind {
        STAMP_DOH => {
            let _props = cursor.u64()?;
            let addr = cursor.lp_string()?;
            let _hashes = cursor.vlp()?;
            let hostname = cursor.lp_string()?;
            let path = cursor.lp_string()?;
            let mut spec = UpstreamSpec::parse(&format!("https://{hostname}{path}"))?;
            spec.pinned = parse_pinned(&addr);
            spec
        }
        STAMP_DOT | STAMP_DOQ => {
            let _props = cursor.u64()?;
            let addr = cursor.lp_string()?;
            let _hashes = cursor.vlp()?;
            let hostname = cursor.lp_string()?;
            let scheme = if kind == STAMP_DOT { "tls" } else { "quic" };
            let mut spec = UpstreamSpec::parse(&format!("{scheme}://{hostname}"))?;
            spec.pinned = parse_pinned(&addr);
            spec
        }
        STAMP_DNSCRYPT => {
            return Err(DomainError::InvalidUpstream(
                "DNSCrypt stamps are not supported".into(),
            ))
        }
        other => {
            return Err(DomainError::InvalidUpstream(format!(
                "unsupported stamp type 0x{other:02x}"
            )))
        }
    };

    spec.raw = stamp.to_string();
    Ok(spec)
}

/// The stamp `addr` field is `ip`, `ip:port`, or empty.
fn parse_pinned(addr: &str) -> Option<IpAddr> {
    if addr.is_empty() {
        return None;
    }
    let host = addr
        .strip_prefix('[')
        .and_then(|a| a.split(']').next())
        .unwrap_or_else(|| addr.rsplit_once(':').map_or(addr, |(h, _)| h));
    host.parse::<IpAddr>().ok()
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, DomainError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| DomainError::InvalidUpstream("truncated stamp".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn u64(&mut self) -> Result<u64, DomainError> {
        if self.pos + 8 > self.data.len() {
            return Err(DomainError::InvalidUpstream("truncated stamp".into()));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(buf))
    }

    fn lp(&mut self) -> Result<&'a [u8], DomainError> {
        let len = self.u8()? as usize;
        if self.pos + len > self.data.len() {
            return Err(DomainError::InvalidUpstream("truncated stamp".into()));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn lp_string(&mut self) -> Result<String, DomainError> {
        let bytes = self.lp()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DomainError::InvalidUpstream("stamp field is not utf-8".into()))
    }

    /// Variable-length set: the high bit of each length byte marks "more
    /// items follow".
    fn vlp(&mut self) -> Result<Vec<Vec<u8>>, DomainError> {
        let mut items = Vec::new();
        loop {
            let len_byte = self.u8()?;
            let more = len_byte & 0x80 != 0;
            let len = (len_byte & 0x7f) as usize;
            if self.pos + len > self.data.len() {
                return Err(DomainError::InvalidUpstream("truncated stamp".into()));
            }
            items.push(self.data[self.pos..self.pos + len].to_vec());
            self.pos += len;
            if !more {
                return Ok(items);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamProto;

    fn lp(out: &mut Vec<u8>, s: &str) {
        out.push(s.len() as u8);
        out.extend_from_slice(s.as_bytes());
    }

    fn make_stamp(kind: u8, addr: &str, hostname: &str, path: Option<&str>) -> String {
        let mut bytes = vec![kind];
        bytes.extend_from_slice(&0u64.to_le_bytes());
        lp(&mut bytes, addr);
        bytes.push(0); // empty hash set
        lp(&mut bytes, hostname);
        if let Some(path) = path {
            lp(&mut bytes, path);
        }
        format!("sdns://{}", URL_SAFE_NO_PAD.encode(&bytes))
    }

    #[test]
    fn test_decode_doh_stamp() {
        let stamp = make_stamp(0x02, "9.9.9.9", "dns.quad9.net", Some("/dns-query"));
        let spec = decode_stamp(&stamp).unwrap();
        assert_eq!(spec.proto, UpstreamProto::Https);
        assert_eq!(spec.host, "dns.quad9.net");
        assert_eq!(spec.path.as_deref(), Some("/dns-query"));
        assert_eq!(spec.pinned, Some("9.9.9.9".parse().unwrap()));
        assert_eq!(spec.raw, stamp);
    }

    #[test]
    fn test_decode_dot_stamp() {
        let stamp = make_stamp(0x03, "", "dns.example.net", None);
        let spec = decode_stamp(&stamp).unwrap();
        assert_eq!(spec.proto, UpstreamProto::Tls);
        assert!(spec.pinned.is_none());
    }

    #[test]
    fn test_dnscrypt_stamp_rejected() {
        let stamp = make_stamp(0x01, "9.9.9.9", "x", None);
        assert!(decode_stamp(&stamp).is_err());
    }

    #[test]
    fn test_garbage_stamp_rejected() {
        assert!(decode_stamp("sdns://!!!").is_err());
        assert!(decode_stamp("https://nope").is_err());
    }
}
