use std::sync::Arc;
use tokio::sync::Notify;
use warden_dns_infrastructure::Core;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
    /// Pinged whenever the control plane changes refresh-relevant config,
    /// so the refresh job re-reads its interval.
    pub config_changed: Arc<Notify>,
}

impl AppState {
    pub fn new(core: Arc<Core>, config_changed: Arc<Notify>) -> Self {
        Self {
            core,
            config_changed,
        }
    }
}
