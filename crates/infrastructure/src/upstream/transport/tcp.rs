use super::DnsTransport;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use warden_dns_domain::DomainError;

/// How long an idle pooled connection stays usable.
const IDLE_TTL: Duration = Duration::from_secs(30);

/// Small idle-connection pool. One outstanding query per connection; a
/// connection goes back only after a clean exchange.
pub struct ConnPool<T> {
    idle: Mutex<Vec<(T, Instant)>>,
    max_idle: usize,
}

impl<T> ConnPool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    pub fn take(&self) -> Option<T> {
        let mut idle = self.idle.lock().unwrap();
        while let Some((conn, since)) = idle.pop() {
            if since.elapsed() < IDLE_TTL {
                return Some(conn);
            }
            // Expired; drop and keep looking.
        }
        None
    }

    pub fn put(&self, conn: T) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_idle {
            idle.push((conn, Instant::now()));
        }
    }
}

/// Read/write one length-prefixed DNS message (RFC 1035 §4.2.2 framing).
pub async fn framed_exchange<S>(
    stream: &mut S,
    message_bytes: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, DomainError>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin + Send,
{
    let exchange = async {
        let mut framed = Vec::with_capacity(2 + message_bytes.len());
        framed.extend_from_slice(&(message_bytes.len() as u16).to_be_bytes());
        framed.extend_from_slice(message_bytes);
        stream
            .write_all(&framed)
            .await
            .map_err(|e| DomainError::UpstreamFailure(format!("tcp write: {e}")))?;

        let mut len_buf = [0u8; 2];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| DomainError::UpstreamFailure(format!("tcp read length: {e}")))?;
        let len = u16::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        stream
            .read_exact(&mut body)
            .await
            .map_err(|e| DomainError::UpstreamFailure(format!("tcp read body: {e}")))?;
        Ok(body)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| DomainError::QueryTimeout)?
}

/// DNS over TCP with connection reuse.
pub struct TcpTransport {
    server_addr: SocketAddr,
    pool: ConnPool<TcpStream>,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            pool: ConnPool::new(4),
        }
    }

    async fn connect(&self, timeout: Duration) -> Result<TcpStream, DomainError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| DomainError::QueryTimeout)?
            .map_err(|e| {
                DomainError::UpstreamFailure(format!("connect {}: {e}", self.server_addr))
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| DomainError::UpstreamFailure(format!("nodelay: {e}")))?;
        Ok(stream)
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        // A pooled connection may have been closed by the server; retry once
        // on a fresh one before giving up.
        if let Some(mut conn) = self.pool.take() {
            match framed_exchange(&mut conn, message_bytes, timeout).await {
                Ok(response) => {
                    self.pool.put(conn);
                    return Ok(response);
                }
                Err(e) => {
                    debug!(server = %self.server_addr, error = %e, "Pooled TCP connection failed; redialing");
                }
            }
        }

        let mut conn = self.connect(timeout).await?;
        let response = framed_exchange(&mut conn, message_bytes, timeout).await?;
        self.pool.put(conn);
        Ok(response)
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}
