use super::transport::{udp::UdpTransport, DnsTransport};
use dashmap::DashMap;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use warden_dns_domain::DomainError;

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves encrypted-upstream host names through plain resolvers, once per
/// host. Only ever consulted off the data plane (first dial).
pub struct Bootstrap {
    resolvers: Vec<SocketAddr>,
    cache: DashMap<String, IpAddr>,
}

impl Bootstrap {
    pub fn new(ips: &[IpAddr]) -> Self {
        Self {
            resolvers: ips.iter().map(|ip| SocketAddr::new(*ip, 53)).collect(),
            cache: DashMap::new(),
        }
    }

    /// Resolve `host` to one address. Literal IPs short-circuit; names go
    /// through each resolver in order, A before AAAA.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, DomainError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        if let Some(cached) = self.cache.get(host) {
            return Ok(*cached);
        }

        for resolver in &self.resolvers {
            for rtype in [RecordType::A, RecordType::AAAA] {
                match self.query_one(resolver, host, rtype).await {
                    Ok(Some(ip)) => {
                        debug!(host, ip = %ip, resolver = %resolver, "Bootstrap resolved");
                        self.cache.insert(host.to_string(), ip);
                        return Ok(ip);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(host, resolver = %resolver, error = %e, "Bootstrap query failed");
                    }
                }
            }
        }

        Err(DomainError::UpstreamFailure(format!(
            "bootstrap resolution failed for {host}"
        )))
    }

    async fn query_one(
        &self,
        resolver: &SocketAddr,
        host: &str,
        rtype: RecordType,
    ) -> Result<Option<IpAddr>, DomainError> {
        let name = Name::from_str(host)
            .map_err(|e| DomainError::InvalidDomainName(format!("{host}: {e}")))?;

        let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        message
            .set_recursion_desired(true)
            .add_query(Query::query(name, rtype));

        let bytes = message
            .to_bytes()
            .map_err(|e| DomainError::UpstreamFailure(format!("encode bootstrap query: {e}")))?;

        let transport = UdpTransport::new(*resolver);
        let response_bytes = transport.send(&bytes, BOOTSTRAP_TIMEOUT).await?;
        let response = Message::from_vec(&response_bytes)
            .map_err(|e| DomainError::UpstreamFailure(format!("decode bootstrap answer: {e}")))?;

        for record in response.answers() {
            match record.data() {
                RData::A(a) => return Ok(Some(IpAddr::V4(a.0))),
                RData::AAAA(aaaa) => return Ok(Some(IpAddr::V6(aaaa.0))),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Seed the cache with a known address (DNS-stamp pins).
    pub fn seed(&self, host: &str, ip: IpAddr) {
        self.cache.insert(host.to_string(), ip);
    }
}
