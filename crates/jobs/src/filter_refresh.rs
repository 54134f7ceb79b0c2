use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_dns_infrastructure::filters::KindMask;
use warden_dns_infrastructure::Core;

/// Failure backoff never exceeds one hour.
const BACKOFF_CAP: Duration = Duration::from_secs(3600);

/// Periodic filter-list refresher.
///
/// One worker loop wakes on the configured interval (0 parks until the
/// config-change notifier fires), walks the store, and rebuilds the matcher
/// when anything changed. Network failure cycles double the poll interval,
/// capped at an hour, until the first success.
pub struct FilterRefreshJob {
    core: Arc<Core>,
    config_changed: Arc<Notify>,
    shutdown: CancellationToken,
}

impl FilterRefreshJob {
    pub fn new(core: Arc<Core>, config_changed: Arc<Notify>) -> Self {
        let shutdown = core.shutdown.clone();
        Self {
            core,
            config_changed,
            shutdown,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting filter refresh job");

        tokio::spawn(async move {
            let mut backoff: Option<Duration> = None;

            loop {
                let interval_hours = {
                    let config = self.core.config.read().await;
                    config.filtering.update_interval_hours
                };

                let sleep_for = match (interval_hours, backoff) {
                    // Interval 0: refreshing is off; park until the config
                    // changes.
                    (0, _) => None,
                    (_, Some(b)) => Some(b),
                    (hours, None) => Some(Duration::from_secs(hours as u64 * 3600)),
                };

                match sleep_for {
                    None => {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = self.config_changed.notified() => continue,
                        }
                    }
                    Some(delay) => {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = self.config_changed.notified() => continue,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }

                match self
                    .core
                    .refresh_filters(KindMask::all(), false, false)
                    .await
                {
                    Ok(summary) => {
                        if summary.all_failed() {
                            let next = backoff
                                .map(|b| (b * 2).min(BACKOFF_CAP))
                                .unwrap_or(Duration::from_secs(60));
                            warn!(
                                failed = summary.failed,
                                retry_in_secs = next.as_secs(),
                                "Filter refresh cycle failed entirely; backing off"
                            );
                            backoff = Some(next);
                        } else {
                            if summary.updated > 0 {
                                info!(
                                    updated = summary.updated,
                                    unchanged = summary.unchanged,
                                    failed = summary.failed,
                                    "Filter refresh cycle completed"
                                );
                            }
                            backoff = None;
                        }
                    }
                    Err(e) => {
                        // "Already running" from a concurrent manual refresh
                        // is not a failure cycle.
                        error!(error = %e, "Filter refresh cycle error");
                    }
                }
            }
            info!("FilterRefreshJob: shutting down");
        });
    }
}
