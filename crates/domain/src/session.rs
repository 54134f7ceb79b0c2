use serde::Serialize;

/// An authenticated admin session.
///
/// The opaque id (32 bytes, presented as lowercase hex in the cookie) keys
/// the record; the persisted value is the wire encoding below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    /// Unix seconds. Only ever moves forward (refresh).
    pub expire: u32,
}

impl Session {
    /// Wire encoding: big-endian `u32 expire | u16 name_len | utf8 name`.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.username.as_bytes();
        let mut buf = Vec::with_capacity(6 + name.len());
        buf.extend_from_slice(&self.expire.to_be_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name);
        buf
    }

    /// Decode a wire record. Returns None for corrupt records, which are
    /// dropped by the store rather than surfaced.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        let expire = u32::from_be_bytes(data[0..4].try_into().ok()?);
        let name_len = u16::from_be_bytes(data[4..6].try_into().ok()?) as usize;
        if data.len() != 6 + name_len {
            return None;
        }
        let username = std::str::from_utf8(&data[6..]).ok()?.to_string();
        Some(Self { username, expire })
    }

    pub fn is_expired(&self, now: u32) -> bool {
        self.expire <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        let s = Session {
            username: "admin".into(),
            expire: 1_700_000_000,
        };
        let decoded = Session::decode(&s.encode()).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn test_wire_layout_is_big_endian() {
        let s = Session {
            username: "u".into(),
            expire: 0x0102_0304,
        };
        assert_eq!(s.encode(), vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x01, b'u']);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(Session::decode(&[0, 0, 0]).is_none());
        // length field claims more bytes than present
        assert!(Session::decode(&[0, 0, 0, 1, 0, 5, b'a']).is_none());
    }

    #[test]
    fn test_decode_rejects_trailing_garbage() {
        let mut buf = Session {
            username: "u".into(),
            expire: 1,
        }
        .encode();
        buf.push(0xff);
        assert!(Session::decode(&buf).is_none());
    }

    #[test]
    fn test_expiry() {
        let s = Session {
            username: "u".into(),
            expire: 100,
        };
        assert!(!s.is_expired(99));
        assert!(s.is_expired(100));
        assert!(s.is_expired(101));
    }
}
