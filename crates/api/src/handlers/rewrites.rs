use crate::dto::RewriteEntry;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use tracing::instrument;
use warden_dns_domain::Rewrite;

#[instrument(skip(state), name = "api_rewrite_list")]
pub async fn list(State(state): State<AppState>) -> Json<Vec<Rewrite>> {
    let config = state.core.config.read().await;
    Json(config.filtering.rewrites.clone())
}

#[instrument(skip(state), name = "api_rewrite_add")]
pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<RewriteEntry>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rewrite = Rewrite::new(body.domain, body.answer);
    rewrite.parse_answer()?;
    {
        let mut config = state.core.config.write().await;
        // Duplicate pairs are idempotent.
        if !config.filtering.rewrites.contains(&rewrite) {
            config.filtering.rewrites.push(rewrite);
        }
    }
    state.core.rebuild_filtering().await;
    state.core.save_config().await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_rewrite_delete")]
pub async fn delete(
    State(state): State<AppState>,
    Json(body): Json<RewriteEntry>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let target = Rewrite::new(body.domain, body.answer);
    {
        let mut config = state.core.config.write().await;
        config.filtering.rewrites.retain(|r| *r != target);
    }
    state.core.rebuild_filtering().await;
    state.core.save_config().await;
    Ok(Json(serde_json::json!({})))
}
