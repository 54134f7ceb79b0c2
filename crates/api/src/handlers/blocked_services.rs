use crate::dto::BlockedServicesRequest;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use tracing::instrument;
use warden_dns_infrastructure::filtering::{service_exists, service_names};

#[instrument(name = "api_blocked_services_all")]
pub async fn all() -> Json<Vec<&'static str>> {
    Json(service_names())
}

#[instrument(skip(state), name = "api_blocked_services_list")]
pub async fn list(State(state): State<AppState>) -> Json<Vec<String>> {
    let config = state.core.config.read().await;
    Json(config.filtering.blocked_services.clone())
}

#[instrument(skip(state), name = "api_blocked_services_set")]
pub async fn set(
    State(state): State<AppState>,
    Json(body): Json<BlockedServicesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    for id in &body.ids {
        if !service_exists(id) {
            return Err(ApiError::bad_request(format!("unknown service: {id}")));
        }
    }
    {
        let mut config = state.core.config.write().await;
        config.filtering.blocked_services = body.ids;
    }
    state.core.reload_runtime().await;
    state.core.save_config().await;
    Ok(Json(serde_json::json!({})))
}
