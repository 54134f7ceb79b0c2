use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use tracing::instrument;
use warden_dns_domain::config::AccessConfig;

#[instrument(skip(state), name = "api_access_list")]
pub async fn list(State(state): State<AppState>) -> Json<AccessConfig> {
    let config = state.core.config.read().await;
    Json(config.access.clone())
}

#[instrument(skip(state, body), name = "api_access_set")]
pub async fn set(
    State(state): State<AppState>,
    Json(body): Json<AccessConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    {
        let mut config = state.core.config.write().await;
        config.access = body;
    }
    state.core.reload_runtime().await;
    state.core.save_config().await;
    Ok(Json(serde_json::json!({})))
}
