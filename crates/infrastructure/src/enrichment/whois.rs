use super::is_public_ip;
use crate::clients::ClientRegistry;
use lru::LruCache;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use warden_dns_domain::WhoisInfo;

const QUEUE_CAPACITY: usize = 255;
const CACHE_CAPACITY: usize = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Responses beyond this are cut; WHOIS servers can be chatty.
const MAX_RESPONSE: usize = 4096;
/// `refer:` redirects followed at most this many times.
const MAX_REDIRECTS: usize = 2;

const IANA_WHOIS: &str = "whois.iana.org";

/// WHOIS enrichment worker. Public addresses only; results land on the
/// client registry as metadata for the matching auto client.
pub struct WhoisEnricher {
    tx: mpsc::Sender<IpAddr>,
}

impl WhoisEnricher {
    pub fn start(registry: Arc<ClientRegistry>, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(worker_loop(rx, registry, shutdown));
        Self { tx }
    }

    pub fn begin(&self, ip: IpAddr) {
        if !is_public_ip(ip) {
            return;
        }
        let _ = self.tx.try_send(ip);
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<IpAddr>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) {
    let mut cache: LruCache<IpAddr, Instant> =
        LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap());

    loop {
        let ip = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("WHOIS enricher: shutting down");
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

        match lookup(ip).await {
            Some(info) if !info.is_empty() => {
                debug!(ip = %ip, org = ?info.orgname, "WHOIS lookup succeeded");
                registry.set_whois_info(ip, info);
            }
            _ => {
                debug!(ip = %ip, "WHOIS lookup returned nothing");
            }
        }
    }
}

async fn lookup(ip: IpAddr) -> Option<WhoisInfo> {
    let mut server = IANA_WHOIS.to_string();

    for _ in 0..=MAX_REDIRECTS {
        let response = query_server(&server, ip).await?;
        let parsed = parse_response(&response);
        if let Some(refer) = parsed.refer {
            server = refer;
            continue;
        }
        return Some(parsed.info);
    }
    None
}

async fn query_server(server: &str, ip: IpAddr) -> Option<String> {
    let addr = format!("{server}:43");
    let exchange = async {
        let mut stream = TcpStream::connect(&addr).await.ok()?;
        stream
            .write_all(format!("{ip}\r\n").as_bytes())
            .await
            .ok()?;

        let mut buf = Vec::with_capacity(MAX_RESPONSE);
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let room = MAX_RESPONSE - buf.len();
                    buf.extend_from_slice(&chunk[..n.min(room)]);
                    if buf.len() >= MAX_RESPONSE {
                        break;
                    }
                }
                Err(_) => return None,
            }
        }
        Some(String::from_utf8_lossy(&buf).into_owned())
    };

    tokio::time::timeout(QUERY_TIMEOUT, exchange).await.ok()?
}

struct ParsedWhois {
    info: WhoisInfo,
    refer: Option<String>,
}

fn parse_response(text: &str) -> ParsedWhois {
    let mut info = WhoisInfo::default();
    let mut refer = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "refer" | "referralserver" => {
                let server = value
                    .trim_start_matches("whois://")
                    .trim_start_matches("rwhois://");
                // Strip any :port suffix; port 43 is assumed.
                let server = server.split(':').next().unwrap_or(server);
                if refer.is_none() && !server.is_empty() {
                    refer = Some(server.to_string());
                }
            }
            "orgname" | "org-name" | "organization" | "owner" | "netname" => {
                if info.orgname.is_none() {
                    info.orgname = Some(value.to_string());
                }
            }
            "country" => {
                if info.country.is_none() {
                    info.country = Some(value.to_string());
                }
            }
            "city" => {
                if info.city.is_none() {
                    info.city = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    ParsedWhois { info, refer }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orgname_and_country() {
        let parsed = parse_response(
            "# comment\nOrgName: Example Networks\nCountry: NL\nCity: Amsterdam\n",
        );
        assert_eq!(parsed.info.orgname.as_deref(), Some("Example Networks"));
        assert_eq!(parsed.info.country.as_deref(), Some("NL"));
        assert_eq!(parsed.info.city.as_deref(), Some("Amsterdam"));
        assert!(parsed.refer.is_none());
    }

    #[test]
    fn test_parse_refer_line() {
        let parsed = parse_response("refer: whois.ripe.net\n");
        assert_eq!(parsed.refer.as_deref(), Some("whois.ripe.net"));
    }

    #[test]
    fn test_parse_referral_server_url() {
        let parsed = parse_response("ReferralServer: whois://whois.arin.net:43\n");
        assert_eq!(parsed.refer.as_deref(), Some("whois.arin.net"));
    }

    #[test]
    fn test_first_value_wins() {
        let parsed = parse_response("netname: FIRST\nOrgName: SECOND\n");
        assert_eq!(parsed.info.orgname.as_deref(), Some("FIRST"));
    }
}
