use crate::clients::ClientRegistry;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use lru::LruCache;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use warden_dns_application::ports::DnsExchanger;
use warden_dns_domain::ClientSource;

const QUEUE_CAPACITY: usize = 256;
const CACHE_CAPACITY: usize = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Reverse-DNS enrichment worker.
///
/// `begin` is fire-and-forget from the data plane: a full queue drops the
/// address (the next query for the same client re-enqueues it). The worker
/// keeps an LRU TTL cache over both successful and failed lookups so each
/// address is tried at most once an hour.
pub struct RdnsEnricher {
    tx: mpsc::Sender<IpAddr>,
}

impl RdnsEnricher {
    pub fn start(
        exchanger: Arc<dyn DnsExchanger>,
        registry: Arc<ClientRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(worker_loop(rx, exchanger, registry, shutdown));
        Self { tx }
    }

    pub fn begin(&self, ip: IpAddr) {
        if ip.is_loopback() {
            return;
        }
        // Drop on full; never block the data plane.
        let _ = self.tx.try_send(ip);
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<IpAddr>,
    exchanger: Arc<dyn DnsExchanger>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) {
    let mut cache: LruCache<IpAddr, Instant> =
        LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap());

    loop {
        let ip = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("rDNS enricher: shutting down");
                return;
            }
            item = rx.recv() => match item {
                Some(ip) => ip,
                None => return,
            },
        };

        if let Some(&seen) = cache.get(&ip) {
            if seen.elapsed() < CACHE_TTL {
                continue;
            }
        }
        cache.put(ip, Instant::now());

        match resolve_ptr(exchanger.as_ref(), ip).await {
            Some(host) => {
                debug!(ip = %ip, host = %host, "rDNS lookup succeeded");
                registry.add_auto(ip, &host, ClientSource::Rdns);
            }
            None => {
                debug!(ip = %ip, "rDNS lookup returned nothing");
            }
        }
    }
}

async fn resolve_ptr(exchanger: &dyn DnsExchanger, ip: IpAddr) -> Option<String> {
    let reverse = reverse_name(&ip);
    let name = Name::from_str(&reverse).ok()?;

    let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
    message
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::PTR));

    let result = exchanger.exchange(&message, LOOKUP_TIMEOUT).await.ok()?;
    for record in result.response.answers() {
        if let RData::PTR(ptr) = record.data() {
            let host = ptr.to_utf8();
            let host = host.trim_end_matches('.');
            if !host.is_empty() {
                return Some(host.to_string());
            }
        }
    }
    None
}

/// `192.0.2.10` → `10.2.0.192.in-addr.arpa`, nibble form for IPv6.
pub fn reverse_name(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles = Vec::with_capacity(32);
            for byte in v6.octets().iter().rev() {
                nibbles.push(format!("{:x}", byte & 0x0f));
                nibbles.push(format!("{:x}", (byte >> 4) & 0x0f));
            }
            format!("{}.ip6.arpa", nibbles.join("."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_name_v4() {
        assert_eq!(
            reverse_name(&"192.0.2.10".parse().unwrap()),
            "10.2.0.192.in-addr.arpa"
        );
    }

    #[test]
    fn test_reverse_name_v6() {
        let name = reverse_name(&"2001:db8::1".parse().unwrap());
        assert!(name.ends_with(".8.b.d.0.1.0.0.2.ip6.arpa"));
        assert!(name.starts_with("1.0.0.0."));
    }
}
