use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;
use tracing::instrument;

/// Which safety toggle a route addresses.
#[derive(Debug, Clone, Copy)]
pub enum SafetyKind {
    SafeBrowsing,
    Parental,
    SafeSearch,
}

async fn set_flag(state: &AppState, kind: SafetyKind, value: bool) {
    {
        let mut config = state.core.config.write().await;
        match kind {
            SafetyKind::SafeBrowsing => config.filtering.safe_browsing = value,
            SafetyKind::Parental => config.filtering.parental = value,
            SafetyKind::SafeSearch => config.filtering.safe_search = value,
        }
    }
    state.core.reload_runtime().await;
    state.core.save_config().await;
}

async fn get_flag(state: &AppState, kind: SafetyKind) -> bool {
    let config = state.core.config.read().await;
    match kind {
        SafetyKind::SafeBrowsing => config.filtering.safe_browsing,
        SafetyKind::Parental => config.filtering.parental,
        SafetyKind::SafeSearch => config.filtering.safe_search,
    }
}

macro_rules! safety_handlers {
    ($module:ident, $kind:expr) => {
        pub mod $module {
            use super::*;

            #[instrument(skip(state))]
            pub async fn enable(
                State(state): State<AppState>,
            ) -> Result<Json<serde_json::Value>, ApiError> {
                set_flag(&state, $kind, true).await;
                Ok(Json(json!({})))
            }

            #[instrument(skip(state))]
            pub async fn disable(
                State(state): State<AppState>,
            ) -> Result<Json<serde_json::Value>, ApiError> {
                set_flag(&state, $kind, false).await;
                Ok(Json(json!({})))
            }

            #[instrument(skip(state))]
            pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
                Json(json!({ "enabled": get_flag(&state, $kind).await }))
            }
        }
    };
}

safety_handlers!(safebrowsing, SafetyKind::SafeBrowsing);
safety_handlers!(parental, SafetyKind::Parental);
safety_handlers!(safesearch, SafetyKind::SafeSearch);
