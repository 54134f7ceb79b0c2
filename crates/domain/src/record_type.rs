use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record types the filtering plane cares about.
///
/// Kept independent of the wire library so the domain layer stays
/// protocol-agnostic; infrastructure converts to/from `hickory_proto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    PTR,
    TXT,
    MX,
    NS,
    SOA,
    SRV,
    HTTPS,
    ANY,
    Other(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            28 => Self::AAAA,
            5 => Self::CNAME,
            12 => Self::PTR,
            16 => Self::TXT,
            15 => Self::MX,
            2 => Self::NS,
            6 => Self::SOA,
            33 => Self::SRV,
            65 => Self::HTTPS,
            255 => Self::ANY,
            other => Self::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::AAAA => 28,
            Self::CNAME => 5,
            Self::PTR => 12,
            Self::TXT => 16,
            Self::MX => 15,
            Self::NS => 2,
            Self::SOA => 6,
            Self::SRV => 33,
            Self::HTTPS => 65,
            Self::ANY => 255,
            Self::Other(v) => v,
        }
    }

    /// Parse the textual form used in `$dnstype=` rule modifiers.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "AAAA" => Some(Self::AAAA),
            "CNAME" => Some(Self::CNAME),
            "PTR" => Some(Self::PTR),
            "TXT" => Some(Self::TXT),
            "MX" => Some(Self::MX),
            "NS" => Some(Self::NS),
            "SOA" => Some(Self::SOA),
            "SRV" => Some(Self::SRV),
            "HTTPS" => Some(Self::HTTPS),
            "ANY" => Some(Self::ANY),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::AAAA => write!(f, "AAAA"),
            Self::CNAME => write!(f, "CNAME"),
            Self::PTR => write!(f, "PTR"),
            Self::TXT => write!(f, "TXT"),
            Self::MX => write!(f, "MX"),
            Self::NS => write!(f, "NS"),
            Self::SOA => write!(f, "SOA"),
            Self::SRV => write!(f, "SRV"),
            Self::HTTPS => write!(f, "HTTPS"),
            Self::ANY => write!(f, "ANY"),
            Self::Other(v) => write!(f, "TYPE{}", v),
        }
    }
}
