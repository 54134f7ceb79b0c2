use crate::auth::AuthedUser;
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use serde_json::json;
use tracing::instrument;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[instrument(skip(state), name = "api_status")]
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (dns_port, http_port, protection_enabled) = {
        let config = state.core.config.read().await;
        (
            config.server.dns_port,
            config.server.web_port,
            config.filtering.enabled,
        )
    };
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    let stats = state.core.stats.snapshot();

    Json(json!({
        "version": VERSION,
        "running": true,
        "hostname": host,
        "dns_port": dns_port,
        "http_port": http_port,
        "protection_enabled": protection_enabled,
        "num_dns_queries": stats.queries,
        "num_blocked_filtering": stats.filtered,
    }))
}

#[instrument(skip_all, name = "api_profile")]
pub async fn profile(Extension(user): Extension<AuthedUser>) -> Json<serde_json::Value> {
    Json(json!({ "name": user.0 }))
}
