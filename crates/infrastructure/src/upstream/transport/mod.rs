pub mod https;
pub mod tcp;
pub mod tls;
pub mod udp;

#[cfg(feature = "dns-over-quic")]
pub mod quic;

use async_trait::async_trait;
use std::time::Duration;
use warden_dns_domain::DomainError;

/// Trait for sending one raw DNS message over the wire.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError>;

    fn protocol_name(&self) -> &'static str;
}

/// Enum-dispatched transport — stack-allocated, no Box/vtable on the hot
/// path.
pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
    #[cfg(feature = "dns-over-rustls")]
    Tls(tls::TlsTransport),
    #[cfg(feature = "dns-over-https")]
    Https(https::HttpsTransport),
    #[cfg(feature = "dns-over-quic")]
    Quic(quic::QuicTransport),
}

impl Transport {
    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        match self {
            Self::Udp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            Self::Tcp(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => DnsTransport::send(t, message_bytes, timeout).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => DnsTransport::send(t, message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(_) => "TLS",
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => "HTTPS",
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => "QUIC",
        }
    }
}

/// Whether a raw response has the TC (truncated) bit set.
pub fn is_truncated(response: &[u8]) -> bool {
    response.len() >= 3 && response[2] & 0x02 != 0
}

/// Shared rustls client config for DoT/DoQ, webpki roots.
#[cfg(any(feature = "dns-over-rustls", feature = "dns-over-quic"))]
pub fn tls_client_config() -> std::sync::Arc<rustls::ClientConfig> {
    use std::sync::OnceLock;
    static CONFIG: OnceLock<std::sync::Arc<rustls::ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let roots = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            std::sync::Arc::new(
                rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}
