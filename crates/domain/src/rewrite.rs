use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A static domain → answer mapping, evaluated before upstream dispatch.
///
/// `domain` may be a `*.x` wildcard. The answer is an IPv4/IPv6 literal, a
/// CNAME target, or the literal tokens `A` / `AAAA` meaning "resolve this
/// type upstream as usual" (used to punch a typed hole in a wildcard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub domain: String,
    pub answer: String,
}

impl Rewrite {
    pub fn new(domain: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            answer: answer.into(),
        }
    }

    pub fn parse_answer(&self) -> Result<RewriteAnswer, DomainError> {
        RewriteAnswer::parse(&self.answer)
    }

    pub fn is_wildcard(&self) -> bool {
        self.domain.starts_with("*.")
    }
}

/// Parsed form of a rewrite answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteAnswer {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    /// Literal `A`: pass A queries through to upstream.
    PassA,
    /// Literal `AAAA`: pass AAAA queries through to upstream.
    PassAaaa,
}

impl RewriteAnswer {
    pub fn parse(answer: &str) -> Result<Self, DomainError> {
        match answer {
            "A" => return Ok(Self::PassA),
            "AAAA" => return Ok(Self::PassAaaa),
            _ => {}
        }
        if let Ok(ip) = answer.parse::<IpAddr>() {
            return Ok(match ip {
                IpAddr::V4(v4) => Self::A(v4),
                IpAddr::V6(v6) => Self::Aaaa(v6),
            });
        }
        if answer.contains('.') && !answer.contains('/') {
            return Ok(Self::Cname(answer.trim_end_matches('.').to_ascii_lowercase()));
        }
        Err(DomainError::InvalidRewrite(format!(
            "answer is neither an IP, a CNAME target, nor A/AAAA: {answer}"
        )))
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::A(v4) => Some(IpAddr::V4(*v4)),
            Self::Aaaa(v6) => Some(IpAddr::V6(*v6)),
            _ => None,
        }
    }
}

/// What a resolved rewrite (chain followed, max 5 hops) answers with.
///
/// `cname` is the last rewritten name when it differs from the query name;
/// `answers` are the addresses of the matching type. An outcome with a
/// `cname` and no addresses means the target must be resolved upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteOutcome {
    pub cname: Option<String>,
    pub answers: Vec<IpAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_answer() {
        let a = RewriteAnswer::parse("192.168.1.10").unwrap();
        assert_eq!(a, RewriteAnswer::A("192.168.1.10".parse().unwrap()));
    }

    #[test]
    fn test_parse_ipv6_answer() {
        let a = RewriteAnswer::parse("::1").unwrap();
        assert_eq!(a, RewriteAnswer::Aaaa("::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_cname_answer() {
        let a = RewriteAnswer::parse("real.example.org.").unwrap();
        assert_eq!(a, RewriteAnswer::Cname("real.example.org".into()));
    }

    #[test]
    fn test_parse_type_passthrough() {
        assert_eq!(RewriteAnswer::parse("A").unwrap(), RewriteAnswer::PassA);
        assert_eq!(RewriteAnswer::parse("AAAA").unwrap(), RewriteAnswer::PassAaaa);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(RewriteAnswer::parse("not/a/thing").is_err());
    }
}
