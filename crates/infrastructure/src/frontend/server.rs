use super::handler::DnsHandler;
use super::pipeline;
use crate::core::Core;
use hickory_proto::op::Message;
use hickory_server::ServerFuture;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use warden_dns_domain::DomainError;

/// Listener lifecycle. `Reconfigure` is meaningful only in `Running`; the
/// snapshot swaps it triggers keep the sockets bound throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// In-flight exchanges get this long to finish on shutdown.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct TlsSettings {
    pub cert_file: String,
    pub key_file: String,
    pub dot_port: u16,
    pub doq_port: u16,
}

/// The DNS frontend: UDP + TCP via hickory's server future, DoT and DoQ as
/// dedicated accept loops sharing the same pipeline. DoH is served by the
/// admin HTTP router.
pub struct DnsServer {
    core: Arc<Core>,
    state: Mutex<ServerState>,
}

impl DnsServer {
    pub fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            state: Mutex::new(ServerState::Stopped),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().unwrap() = state;
        debug!(state = ?state, "DNS server state");
    }

    /// Swap in freshly built config-derived snapshots. Only defined while
    /// running; sockets stay bound.
    pub async fn reconfigure(&self) -> Result<(), DomainError> {
        if self.state() != ServerState::Running {
            return Err(DomainError::IoError(
                "reconfigure is only valid while running".into(),
            ));
        }
        self.core.reload_runtime().await;
        self.core.reload_upstreams().await?;
        self.core.rebuild_filtering().await;
        info!("DNS server reconfigured");
        Ok(())
    }

    /// Bind the listener set and serve until the core's shutdown token
    /// fires. A port already in use surfaces as an error (fatal at startup).
    pub async fn run(
        &self,
        bind_host: IpAddr,
        port: u16,
        tls: Option<TlsSettings>,
    ) -> Result<(), DomainError> {
        self.set_state(ServerState::Starting);
        let socket_addr = SocketAddr::new(bind_host, port);

        info!(bind_address = %socket_addr, "Starting DNS server");

        // socket2 with buffer tuning; default UDP buffers are too small for
        // resolver bursts.
        let domain = if socket_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DomainError::IoError(format!("udp socket: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| DomainError::IoError(format!("reuse_address: {e}")))?;
        socket
            .set_recv_buffer_size(8 * 1024 * 1024)
            .map_err(|e| DomainError::IoError(format!("recv buffer: {e}")))?;
        socket
            .set_send_buffer_size(4 * 1024 * 1024)
            .map_err(|e| DomainError::IoError(format!("send buffer: {e}")))?;
        socket
            .bind(&socket_addr.into())
            .map_err(|e| DomainError::IoError(format!("bind {socket_addr}: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DomainError::IoError(format!("nonblocking: {e}")))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let udp_socket = UdpSocket::from_std(std_socket)
            .map_err(|e| DomainError::IoError(format!("udp socket into tokio: {e}")))?;

        let tcp_listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|e| DomainError::IoError(format!("bind tcp {socket_addr}: {e}")))?;

        let mut server = ServerFuture::new(DnsHandler::new(Arc::clone(&self.core)));
        server.register_socket(udp_socket);
        server.register_listener(tcp_listener, Duration::from_secs(10));

        if let Some(tls) = tls {
            self.spawn_dot_listener(bind_host, &tls).await?;
            #[cfg(feature = "dns-over-quic")]
            self.spawn_doq_listener(bind_host, &tls).await?;
        }

        self.set_state(ServerState::Running);
        info!("DNS server ready");

        let shutdown = self.core.shutdown.clone();
        let draining = tokio::select! {
            _ = shutdown.cancelled() => true,
            result = server.block_until_done() => {
                result.map_err(|e| DomainError::IoError(format!("dns server: {e}")))?;
                false
            }
        };

        if draining {
            self.set_state(ServerState::Stopping);
            info!("DNS server draining");
            let _ = tokio::time::timeout(DRAIN_DEADLINE, server.shutdown_gracefully()).await;
        }

        self.set_state(ServerState::Stopped);
        Ok(())
    }

    fn load_tls_acceptor(tls: &TlsSettings) -> Result<TlsAcceptor, DomainError> {
        let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(
            std::fs::File::open(&tls.cert_file)
                .map_err(|e| DomainError::IoError(format!("opening {}: {e}", tls.cert_file)))?,
        ))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DomainError::IoError(format!("reading certs: {e}")))?;

        let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(
            std::fs::File::open(&tls.key_file)
                .map_err(|e| DomainError::IoError(format!("opening {}: {e}", tls.key_file)))?,
        ))
        .map_err(|e| DomainError::IoError(format!("reading key: {e}")))?
        .ok_or_else(|| DomainError::IoError(format!("no private key in {}", tls.key_file)))?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| DomainError::IoError(format!("tls config: {e}")))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }

    async fn spawn_dot_listener(
        &self,
        bind_host: IpAddr,
        tls: &TlsSettings,
    ) -> Result<(), DomainError> {
        let acceptor = Self::load_tls_acceptor(tls)?;
        let addr = SocketAddr::new(bind_host, tls.dot_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DomainError::IoError(format!("bind dot {addr}: {e}")))?;
        info!(bind_address = %addr, "DoT listener ready");

        let core = Arc::clone(&self.core);
        let shutdown = self.core.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "DoT accept failed");
                            continue;
                        }
                    },
                };
                let acceptor = acceptor.clone();
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let client_id = client_id_from_sni(
                                tls_stream.get_ref().1.server_name(),
                            );
                            serve_framed(core, tls_stream, peer, client_id).await;
                        }
                        Err(e) => debug!(peer = %peer, error = %e, "DoT handshake failed"),
                    }
                });
            }
            info!("DoT listener stopped");
        });
        Ok(())
    }

    #[cfg(feature = "dns-over-quic")]
    async fn spawn_doq_listener(
        &self,
        bind_host: IpAddr,
        tls: &TlsSettings,
    ) -> Result<(), DomainError> {
        use quinn::crypto::rustls::QuicServerConfig;

        let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(
            std::fs::File::open(&tls.cert_file)
                .map_err(|e| DomainError::IoError(format!("opening {}: {e}", tls.cert_file)))?,
        ))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DomainError::IoError(format!("reading certs: {e}")))?;
        let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(
            std::fs::File::open(&tls.key_file)
                .map_err(|e| DomainError::IoError(format!("opening {}: {e}", tls.key_file)))?,
        ))
        .map_err(|e| DomainError::IoError(format!("reading key: {e}")))?
        .ok_or_else(|| DomainError::IoError(format!("no private key in {}", tls.key_file)))?;

        let mut tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| DomainError::IoError(format!("tls config: {e}")))?;
        tls_config.alpn_protocols = vec![b"doq".to_vec()];

        let quic_config = QuicServerConfig::try_from(tls_config)
            .map_err(|e| DomainError::IoError(format!("doq tls: {e}")))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_config));

        let addr = SocketAddr::new(bind_host, tls.doq_port);
        let endpoint = quinn::Endpoint::server(server_config, addr)
            .map_err(|e| DomainError::IoError(format!("bind doq {addr}: {e}")))?;
        info!(bind_address = %addr, "DoQ listener ready");

        let core = Arc::clone(&self.core);
        let shutdown = self.core.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let incoming = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    incoming = endpoint.accept() => match incoming {
                        Some(i) => i,
                        None => break,
                    },
                };
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    let Ok(connection) = incoming.await else {
                        return;
                    };
                    let peer = connection.remote_address();
                    while let Ok((mut send, mut recv)) = connection.accept_bi().await {
                        let core = Arc::clone(&core);
                        tokio::spawn(async move {
                            let Ok(frame) = recv.read_to_end(65_537).await else {
                                return;
                            };
                            if frame.len() < 2 {
                                return;
                            }
                            let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
                            if frame.len() < 2 + len {
                                return;
                            }
                            let Ok(query) = Message::from_vec(&frame[2..2 + len]) else {
                                return;
                            };
                            if let Some(response) =
                                pipeline::handle_query(&core, query, peer.ip(), None).await
                            {
                                if let Ok(bytes) = response.to_vec() {
                                    let mut framed =
                                        Vec::with_capacity(2 + bytes.len());
                                    framed.extend_from_slice(
                                        &(bytes.len() as u16).to_be_bytes(),
                                    );
                                    framed.extend_from_slice(&bytes);
                                    let _ = send.write_all(&framed).await;
                                    let _ = send.finish();
                                }
                            }
                        });
                    }
                });
            }
            info!("DoQ listener stopped");
        });
        Ok(())
    }
}

/// A ClientID rides the first SNI label when the client prepends one
/// (`clientid.dns.example.com`).
fn client_id_from_sni(sni: Option<&str>) -> Option<String> {
    let sni = sni?;
    let mut labels = sni.split('.');
    let first = labels.next()?;
    // The server's own name needs at least three labels of its own.
    if labels.count() >= 3 {
        Some(first.to_ascii_lowercase())
    } else {
        None
    }
}

/// Serve length-prefixed DNS messages over one stream (DoT).
async fn serve_framed<S>(
    core: Arc<Core>,
    mut stream: S,
    peer: SocketAddr,
    client_id: Option<String>,
) where
    S: AsyncReadExt + AsyncWriteExt + Unpin + Send,
{
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        let Ok(query) = Message::from_vec(&body) else {
            return;
        };

        let Some(response) =
            pipeline::handle_query(&core, query, peer.ip(), client_id.as_deref()).await
        else {
            continue;
        };
        let Ok(bytes) = response.to_vec() else {
            return;
        };
        let mut framed = Vec::with_capacity(2 + bytes.len());
        framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        framed.extend_from_slice(&bytes);
        if stream.write_all(&framed).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_sni() {
        assert_eq!(
            client_id_from_sni(Some("kids-tablet.dns.example.com")),
            Some("kids-tablet".into())
        );
        assert_eq!(client_id_from_sni(Some("dns.example.com")), None);
        assert_eq!(client_id_from_sni(None), None);
    }
}
