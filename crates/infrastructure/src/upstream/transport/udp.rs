use super::DnsTransport;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use warden_dns_domain::DomainError;

/// Maximum UDP DNS response size with EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Plain DNS over UDP. Truncated responses are the caller's cue to retry
/// the exchange over TCP.
pub struct UdpTransport {
    server_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::UpstreamFailure(format!("bind udp socket: {e}")))?;

        tokio::time::timeout(timeout, socket.send_to(message_bytes, self.server_addr))
            .await
            .map_err(|_| DomainError::QueryTimeout)?
            .map_err(|e| {
                DomainError::UpstreamFailure(format!("send to {}: {e}", self.server_addr))
            })?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (n, from) = tokio::time::timeout(timeout, socket.recv_from(&mut recv_buf))
                .await
                .map_err(|_| DomainError::QueryTimeout)?
                .map_err(|e| {
                    DomainError::UpstreamFailure(format!("recv from {}: {e}", self.server_addr))
                })?;

            // Off-path garbage: keep waiting for the real answer.
            if from.ip() != self.server_addr.ip() {
                warn!(expected = %self.server_addr, received_from = %from, "UDP response from unexpected source");
                continue;
            }

            recv_buf.truncate(n);
            debug!(server = %self.server_addr, bytes = n, "UDP response received");
            return Ok(recv_buf);
        }
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}
