#![cfg(feature = "dns-over-rustls")]

use super::tcp::{framed_exchange, ConnPool};
use super::{tls_client_config, DnsTransport};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use warden_dns_domain::DomainError;

/// DNS over TLS (RFC 7858). SNI is the upstream's host name; framing is the
/// same length prefix as TCP. One outstanding query per connection.
pub struct TlsTransport {
    server_addr: SocketAddr,
    server_name: String,
    pool: ConnPool<TlsStream<TcpStream>>,
}

impl TlsTransport {
    pub fn new(server_addr: SocketAddr, server_name: String) -> Self {
        Self {
            server_addr,
            server_name,
            pool: ConnPool::new(4),
        }
    }

    async fn connect(&self, timeout: Duration) -> Result<TlsStream<TcpStream>, DomainError> {
        let sni = ServerName::try_from(self.server_name.clone()).map_err(|_| {
            DomainError::UpstreamFailure(format!("bad TLS server name: {}", self.server_name))
        })?;

        let dial = async {
            let tcp = TcpStream::connect(self.server_addr).await.map_err(|e| {
                DomainError::UpstreamFailure(format!("connect {}: {e}", self.server_addr))
            })?;
            tcp.set_nodelay(true)
                .map_err(|e| DomainError::UpstreamFailure(format!("nodelay: {e}")))?;
            let connector = TlsConnector::from(tls_client_config());
            connector.connect(sni, tcp).await.map_err(|e| {
                DomainError::UpstreamFailure(format!("tls handshake {}: {e}", self.server_name))
            })
        };

        tokio::time::timeout(timeout, dial)
            .await
            .map_err(|_| DomainError::QueryTimeout)?
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        if let Some(mut conn) = self.pool.take() {
            match framed_exchange(&mut conn, message_bytes, timeout).await {
                Ok(response) => {
                    self.pool.put(conn);
                    return Ok(response);
                }
                Err(e) => {
                    debug!(server = %self.server_name, error = %e, "Pooled TLS connection failed; redialing");
                }
            }
        }

        let mut conn = self.connect(timeout).await?;
        let response = framed_exchange(&mut conn, message_bytes, timeout).await?;
        self.pool.put(conn);
        Ok(response)
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }
}
