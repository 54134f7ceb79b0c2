use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use warden_dns_infrastructure::Core;

/// Periodic /etc/hosts and ARP ingestion for the client registry. The ARP
/// scan also keeps the MAC → IP table current for MAC-keyed client ids.
pub struct ClientScanJob {
    core: Arc<Core>,
    arp_interval_secs: u64,
    hosts_interval_secs: u64,
    shutdown: CancellationToken,
}

impl ClientScanJob {
    pub fn new(core: Arc<Core>) -> Self {
        let shutdown = core.shutdown.clone();
        Self {
            core,
            arp_interval_secs: 60,
            hosts_interval_secs: 300,
            shutdown,
        }
    }

    pub fn with_intervals(mut self, arp_secs: u64, hosts_secs: u64) -> Self {
        self.arp_interval_secs = arp_secs;
        self.hosts_interval_secs = hosts_secs;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting client scan jobs");

        let arp_job = Arc::clone(&self);
        let arp_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(arp_job.arp_interval_secs));
            loop {
                tokio::select! {
                    _ = arp_shutdown.cancelled() => {
                        info!("ClientScanJob (arp): shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = arp_job.core.arp.scan().await {
                            debug!(error = %e, "ARP scan failed");
                        }
                    }
                }
            }
        });

        let hosts_job = Arc::clone(&self);
        let hosts_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(hosts_job.hosts_interval_secs));
            loop {
                tokio::select! {
                    _ = hosts_shutdown.cancelled() => {
                        info!("ClientScanJob (hosts): shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = hosts_job.core.hosts_scanner.scan().await {
                            debug!(error = %e, "Hosts file scan failed");
                        }
                    }
                }
            }
        });
    }
}
