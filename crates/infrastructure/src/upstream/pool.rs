use super::bootstrap::Bootstrap;
use super::transport::{is_truncated, tcp::TcpTransport, udp::UdpTransport, Transport};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinEncodable;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use warden_dns_application::ports::{DnsExchanger, ExchangeResult};
use warden_dns_domain::{DomainError, UpstreamProto, UpstreamSets, UpstreamSpec};

/// One dialed upstream: spec plus a lazily built transport. The dial (and
/// any bootstrap resolution) happens on first use and is cached for the
/// lifetime of the pool.
pub struct Upstream {
    spec: UpstreamSpec,
    display: Arc<str>,
    bootstrap: Arc<Bootstrap>,
    addr: OnceCell<SocketAddr>,
    transport: OnceCell<Transport>,
}

impl Upstream {
    pub fn new(spec: UpstreamSpec, shared_bootstrap: &Arc<Bootstrap>) -> Self {
        // A per-upstream bootstrap list overrides the shared one.
        let bootstrap = if spec.bootstrap.is_empty() {
            Arc::clone(shared_bootstrap)
        } else {
            Arc::new(Bootstrap::new(&spec.bootstrap))
        };
        if let Some(pinned) = spec.pinned {
            bootstrap.seed(&spec.host, pinned);
        }
        let display: Arc<str> = Arc::from(spec.raw.as_str());
        Self {
            spec,
            display,
            bootstrap,
            addr: OnceCell::new(),
            transport: OnceCell::new(),
        }
    }

    pub fn display(&self) -> &Arc<str> {
        &self.display
    }

    async fn addr(&self) -> Result<SocketAddr, DomainError> {
        self.addr
            .get_or_try_init(|| async {
                let ip: IpAddr = self.bootstrap.resolve(&self.spec.host).await?;
                Ok(SocketAddr::new(ip, self.spec.port))
            })
            .await
            .copied()
    }

    async fn transport(&self) -> Result<&Transport, DomainError> {
        self.transport
            .get_or_try_init(|| async {
                let transport = match self.spec.proto {
                    UpstreamProto::Udp => Transport::Udp(UdpTransport::new(self.addr().await?)),
                    UpstreamProto::Tcp => Transport::Tcp(TcpTransport::new(self.addr().await?)),
                    #[cfg(feature = "dns-over-rustls")]
                    UpstreamProto::Tls => Transport::Tls(super::transport::tls::TlsTransport::new(
                        self.addr().await?,
                        self.spec.host.clone(),
                    )),
                    #[cfg(not(feature = "dns-over-rustls"))]
                    UpstreamProto::Tls => {
                        return Err(DomainError::UpstreamFailure(
                            "DNS-over-TLS support not compiled in".into(),
                        ))
                    }
                    #[cfg(feature = "dns-over-https")]
                    UpstreamProto::Https => {
                        let resolved = if self.spec.host_is_ip() {
                            None
                        } else {
                            Some(self.addr().await?)
                        };
                        Transport::Https(super::transport::https::HttpsTransport::new(
                            &self.spec.host,
                            self.spec.port,
                            self.spec.path.as_deref().unwrap_or("/dns-query"),
                            resolved,
                        )?)
                    }
                    #[cfg(not(feature = "dns-over-https"))]
                    UpstreamProto::Https => {
                        return Err(DomainError::UpstreamFailure(
                            "DNS-over-HTTPS support not compiled in".into(),
                        ))
                    }
                    #[cfg(feature = "dns-over-quic")]
                    UpstreamProto::Quic => {
                        Transport::Quic(super::transport::quic::QuicTransport::new(
                            self.addr().await?,
                            self.spec.host.clone(),
                        ))
                    }
                    #[cfg(not(feature = "dns-over-quic"))]
                    UpstreamProto::Quic => {
                        return Err(DomainError::UpstreamFailure(
                            "DNS-over-QUIC support not compiled in".into(),
                        ))
                    }
                };
                Ok(transport)
            })
            .await
    }

    /// Exchange raw message bytes. Plain UDP falls back to TCP when the
    /// response comes back truncated.
    pub async fn exchange_bytes(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let transport = self.transport().await?;
        let response = transport.send(message_bytes, timeout).await?;

        if matches!(self.spec.proto, UpstreamProto::Udp) && is_truncated(&response) {
            debug!(upstream = %self.display, "Truncated UDP response; retrying over TCP");
            let tcp = TcpTransport::new(self.addr().await?);
            return super::transport::DnsTransport::send(&tcp, message_bytes, timeout).await;
        }

        Ok(response)
    }
}

struct ReservedGroup {
    /// Lowercased suffixes without leading dots.
    domains: Vec<String>,
    /// None routes the reservation to the default group (`#`).
    upstreams: Option<Vec<Arc<Upstream>>>,
}

/// The upstream pool: a default group plus per-domain reserved groups, and
/// the dispatch policy over whichever group a query selects.
///
/// Replaced as a whole on config reload; in-flight exchanges finish against
/// the pool they started with.
pub struct UpstreamPool {
    default: Vec<Arc<Upstream>>,
    reserved: Vec<ReservedGroup>,
    all_servers: bool,
    timeout: Duration,
}

impl UpstreamPool {
    pub fn build(
        sets: &UpstreamSets,
        bootstrap_ips: &[IpAddr],
        all_servers: bool,
        timeout_secs: u64,
    ) -> Result<Self, DomainError> {
        let shared = Arc::new(Bootstrap::new(bootstrap_ips));

        let default: Vec<Arc<Upstream>> = sets
            .default
            .iter()
            .map(|spec| Arc::new(Upstream::new(spec.clone(), &shared)))
            .collect();

        let reserved = sets
            .reserved
            .iter()
            .map(|r| ReservedGroup {
                domains: r.domains.clone(),
                upstreams: if r.servers.is_empty() {
                    None
                } else {
                    Some(
                        r.servers
                            .iter()
                            .map(|spec| Arc::new(Upstream::new(spec.clone(), &shared)))
                            .collect(),
                    )
                },
            })
            .collect();

        Ok(Self {
            default,
            reserved,
            all_servers,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// The group serving `name`: the most specific matching reservation,
    /// else the default group.
    fn group_for(&self, name: &str) -> &[Arc<Upstream>] {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        let mut best: Option<(&ReservedGroup, usize)> = None;
        for group in &self.reserved {
            for domain in &group.domains {
                let matches = name == *domain
                    || (name.len() > domain.len()
                        && name.ends_with(domain.as_str())
                        && name.as_bytes()[name.len() - domain.len() - 1] == b'.');
                if matches {
                    let specificity = domain.split('.').count();
                    if best.map_or(true, |(_, s)| specificity > s) {
                        best = Some((group, specificity));
                    }
                }
            }
        }
        match best {
            Some((group, _)) => group.upstreams.as_deref().unwrap_or(&self.default),
            None => &self.default,
        }
    }

    pub fn upstream_displays(&self) -> Vec<Arc<str>> {
        self.default.iter().map(|u| Arc::clone(u.display())).collect()
    }

    async fn dispatch(
        &self,
        group: &[Arc<Upstream>],
        message_bytes: Arc<[u8]>,
        deadline: Duration,
    ) -> Result<(Vec<u8>, Arc<str>), DomainError> {
        if group.is_empty() {
            return Err(DomainError::AllUpstreamsFailed);
        }

        if self.all_servers {
            // First-come race; dropping the stream cancels the losers.
            let mut in_flight: FuturesUnordered<_> = group
                .iter()
                .map(|upstream| {
                    let upstream = Arc::clone(upstream);
                    let bytes = Arc::clone(&message_bytes);
                    async move {
                        upstream
                            .exchange_bytes(&bytes, deadline)
                            .await
                            .map(|resp| (resp, Arc::clone(upstream.display())))
                    }
                })
                .collect();

            let mut last_error = DomainError::AllUpstreamsFailed;
            while let Some(result) = in_flight.next().await {
                match result {
                    Ok(ok) => return Ok(ok),
                    Err(e) => last_error = e,
                }
            }
            return Err(last_error);
        }

        let mut last_error = DomainError::AllUpstreamsFailed;
        for upstream in group {
            match upstream.exchange_bytes(&message_bytes, deadline).await {
                Ok(response) => return Ok((response, Arc::clone(upstream.display()))),
                Err(e) => {
                    warn!(upstream = %upstream.display(), error = %e, "Upstream failed; trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl DnsExchanger for UpstreamPool {
    async fn exchange(
        &self,
        query: &Message,
        deadline: Duration,
    ) -> Result<ExchangeResult, DomainError> {
        let name = query
            .queries()
            .first()
            .map(|q| q.name().to_utf8())
            .unwrap_or_default();

        // Fresh transaction id per exchange; the original is restored on the
        // way back so the client sees its own.
        let original_id = query.id();
        let mut outbound = query.clone();
        outbound.set_id(fastrand::u16(..));

        let bytes: Arc<[u8]> = Arc::from(
            outbound
                .to_bytes()
                .map_err(|e| DomainError::UpstreamFailure(format!("encode query: {e}")))?,
        );

        let deadline = if deadline.is_zero() { self.timeout } else { deadline };
        let group = self.group_for(&name);

        let started = Instant::now();
        let (response_bytes, upstream) = self.dispatch(group, bytes, deadline).await?;
        let elapsed = started.elapsed();

        let mut response = Message::from_vec(&response_bytes)
            .map_err(|e| DomainError::UpstreamFailure(format!("decode response: {e}")))?;
        response.set_id(original_id);

        Ok(ExchangeResult {
            response,
            upstream,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(lines: &[&str], all_servers: bool) -> UpstreamPool {
        let sets =
            UpstreamSets::parse(&lines.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();
        UpstreamPool::build(&sets, &[], all_servers, 10).unwrap()
    }

    #[test]
    fn test_group_selection_reserved_vs_default() {
        let p = pool(&["[/corp.local/]10.0.0.1", "1.1.1.1"], false);
        let corp = p.group_for("host.corp.local");
        assert_eq!(corp.len(), 1);
        assert_eq!(corp[0].display().as_ref(), "10.0.0.1");

        let public = p.group_for("example.com");
        assert_eq!(public[0].display().as_ref(), "1.1.1.1");
    }

    #[test]
    fn test_hash_reservation_uses_default_group() {
        let p = pool(&["[/lan/]#", "1.1.1.1"], false);
        let group = p.group_for("printer.lan");
        assert_eq!(group[0].display().as_ref(), "1.1.1.1");
    }

    #[test]
    fn test_most_specific_reservation_wins() {
        let p = pool(
            &["[/example.com/]10.0.0.1", "[/sub.example.com/]10.0.0.2", "9.9.9.9"],
            false,
        );
        assert_eq!(p.group_for("a.sub.example.com")[0].display().as_ref(), "10.0.0.2");
        assert_eq!(p.group_for("www.example.com")[0].display().as_ref(), "10.0.0.1");
    }
}
