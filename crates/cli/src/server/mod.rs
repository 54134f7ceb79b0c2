use crate::di;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_dns_api::{create_router, AppState};
use warden_dns_domain::Config;
use warden_dns_infrastructure::{DnsServer, TlsSettings};

/// Run the DNS frontend and the admin server until ctrl-c.
pub async fn run(config: Config, config_path: String) -> anyhow::Result<()> {
    let bind_host: IpAddr = config.server.bind_host.parse()?;
    let dns_port = config.server.dns_port;
    let web_port = config.server.web_port;

    let tls = if config.server.tls.enabled {
        match (&config.server.tls.cert_file, &config.server.tls.key_file) {
            (Some(cert), Some(key)) => Some(TlsSettings {
                cert_file: cert.clone(),
                key_file: key.clone(),
                dot_port: config.server.tls.dot_port,
                doq_port: config.server.tls.doq_port,
            }),
            _ => {
                anyhow::bail!("tls.enabled requires cert_file and key_file");
            }
        }
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let (core, config_changed) = di::build(config, config_path, shutdown.clone()).await?;

    // Admin HTTP server (control surface + DoH).
    let state = AppState::new(Arc::clone(&core), config_changed);
    let router = create_router(state);
    let web_addr = SocketAddr::new(bind_host, web_port);
    let listener = tokio::net::TcpListener::bind(web_addr).await?;
    info!(bind_address = %web_addr, "Admin server ready");

    let admin_shutdown = shutdown.clone();
    let admin = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { admin_shutdown.cancelled().await })
        .await
    });

    // Ctrl-c flips the shared token; every subsystem drains off it.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    let dns_server = DnsServer::new(Arc::clone(&core));
    dns_server.run(bind_host, dns_port, tls).await?;

    shutdown.cancel();
    let _ = admin.await;
    info!("Shutdown complete");
    Ok(())
}
