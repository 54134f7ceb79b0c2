#![cfg(feature = "dns-over-quic")]

use super::{tls_client_config, DnsTransport};
use async_trait::async_trait;
use quinn::crypto::rustls::QuicClientConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use warden_dns_domain::DomainError;

/// ALPN token for DNS-over-QUIC (RFC 9250).
const DOQ_ALPN: &[u8] = b"doq";

/// DNS over QUIC. One bidirectional stream per query over a shared
/// connection; messages use the same 2-byte length prefix as TCP, and the
/// message id must be 0 on the wire.
pub struct QuicTransport {
    server_addr: SocketAddr,
    server_name: String,
    /// Endpoint and connection live together: dropping the endpoint would
    /// tear the connection down.
    connection: Mutex<Option<(quinn::Endpoint, quinn::Connection)>>,
}

impl QuicTransport {
    pub fn new(server_addr: SocketAddr, server_name: String) -> Self {
        Self {
            server_addr,
            server_name,
            connection: Mutex::new(None),
        }
    }

    async fn connection(&self, timeout: Duration) -> Result<quinn::Connection, DomainError> {
        let mut guard = self.connection.lock().await;
        if let Some((_, conn)) = guard.as_ref() {
            if conn.close_reason().is_none() {
                return Ok(conn.clone());
            }
        }

        let mut tls = (*tls_client_config()).clone();
        tls.alpn_protocols = vec![DOQ_ALPN.to_vec()];
        let quic_tls = QuicClientConfig::try_from(tls)
            .map_err(|e| DomainError::UpstreamFailure(format!("doq tls config: {e}")))?;
        let client_config = quinn::ClientConfig::new(Arc::new(quic_tls));

        let bind: SocketAddr = if self.server_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = quinn::Endpoint::client(bind)
            .map_err(|e| DomainError::UpstreamFailure(format!("doq endpoint: {e}")))?;
        endpoint.set_default_client_config(client_config);

        let connecting = endpoint
            .connect(self.server_addr, &self.server_name)
            .map_err(|e| DomainError::UpstreamFailure(format!("doq connect: {e}")))?;
        let conn = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| DomainError::QueryTimeout)?
            .map_err(|e| DomainError::UpstreamFailure(format!("doq handshake: {e}")))?;

        debug!(server = %self.server_addr, "DoQ connection established");
        *guard = Some((endpoint, conn.clone()));
        Ok(conn)
    }
}

#[async_trait]
impl DnsTransport for QuicTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        let conn = self.connection(timeout).await?;

        let exchange = async {
            let (mut send, mut recv) = conn
                .open_bi()
                .await
                .map_err(|e| DomainError::UpstreamFailure(format!("doq stream: {e}")))?;

            // RFC 9250: id 0 on the wire.
            let mut framed = Vec::with_capacity(2 + message_bytes.len());
            framed.extend_from_slice(&(message_bytes.len() as u16).to_be_bytes());
            framed.extend_from_slice(message_bytes);
            framed[2] = 0;
            framed[3] = 0;

            send.write_all(&framed)
                .await
                .map_err(|e| DomainError::UpstreamFailure(format!("doq write: {e}")))?;
            send.finish()
                .map_err(|e| DomainError::UpstreamFailure(format!("doq finish: {e}")))?;

            let body = recv
                .read_to_end(65_537)
                .await
                .map_err(|e| DomainError::UpstreamFailure(format!("doq read: {e}")))?;
            if body.len() < 2 {
                return Err(DomainError::UpstreamFailure("doq short response".into()));
            }
            let len = u16::from_be_bytes([body[0], body[1]]) as usize;
            if body.len() < 2 + len {
                return Err(DomainError::UpstreamFailure("doq truncated response".into()));
            }
            Ok(body[2..2 + len].to_vec())
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DomainError::QueryTimeout)?
    }

    fn protocol_name(&self) -> &'static str {
        "QUIC"
    }
}
