use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_dns_domain::Config;

/// Initialize the global subscriber. `RUST_LOG` wins over the config level
/// when set, so operators can crank single modules without editing the file.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    info!(level = %config.logging.level, "Logging initialized");
}
