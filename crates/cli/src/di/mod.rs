use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_dns_domain::Config;
use warden_dns_infrastructure::Core;
use warden_dns_jobs::{ClientScanJob, FilterRefreshJob};

/// Composition root: build the core and start the background jobs.
pub async fn build(
    config: Config,
    config_path: String,
    shutdown: CancellationToken,
) -> anyhow::Result<(Arc<Core>, Arc<Notify>)> {
    let core = Core::build(config, Some(config_path), shutdown).await?;
    let config_changed = Arc::new(Notify::new());

    // Prime the registry before the first queries arrive.
    let _ = core.arp.scan().await;
    let _ = core.hosts_scanner.scan().await;

    Arc::new(FilterRefreshJob::new(
        Arc::clone(&core),
        Arc::clone(&config_changed),
    ))
    .start()
    .await;

    Arc::new(ClientScanJob::new(Arc::clone(&core))).start().await;

    info!("Core assembled");
    Ok((core, config_changed))
}
