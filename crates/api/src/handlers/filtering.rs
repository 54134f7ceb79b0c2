use crate::dto::{
    AddUrlRequest, CheckHostQuery, CheckHostResponse, FilterEntry, FilteringConfigRequest,
    FilteringStatusResponse, RefreshRequest, RefreshResponse, RemoveUrlRequest, SetRulesRequest,
    SetUrlRequest,
};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use tracing::{info, instrument};
use warden_dns_domain::config::filtering::REFRESH_INTERVALS_HOURS;
use warden_dns_domain::{Decision, FilterKind, RecordType};
use warden_dns_infrastructure::filters::KindMask;

#[instrument(skip(state), name = "api_filtering_status")]
pub async fn status(State(state): State<AppState>) -> Json<FilteringStatusResponse> {
    let (enabled, interval, user_rules) = {
        let config = state.core.config.read().await;
        (
            config.filtering.enabled,
            config.filtering.update_interval_hours,
            config.filtering.user_rules.clone(),
        )
    };
    let lists = state.core.store.lists();
    let (filters, whitelist_filters) = lists
        .iter()
        .partition::<Vec<_>, _>(|l| matches!(l.kind, FilterKind::Blocklist));

    Json(FilteringStatusResponse {
        enabled,
        interval,
        filters: filters.iter().map(|l| FilterEntry::from(*l)).collect(),
        whitelist_filters: whitelist_filters
            .iter()
            .map(|l| FilterEntry::from(*l))
            .collect(),
        user_rules,
    })
}

#[instrument(skip(state), name = "api_filtering_config")]
pub async fn set_config(
    State(state): State<AppState>,
    Json(body): Json<FilteringConfigRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !REFRESH_INTERVALS_HOURS.contains(&body.interval) {
        return Err(ApiError::bad_request(format!(
            "interval must be one of {REFRESH_INTERVALS_HOURS:?}"
        )));
    }
    {
        let mut config = state.core.config.write().await;
        config.filtering.enabled = body.enabled;
        config.filtering.update_interval_hours = body.interval;
    }
    state.core.reload_runtime().await;
    state.core.save_config().await;
    state.config_changed.notify_waiters();
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_filtering_add_url")]
pub async fn add_url(
    State(state): State<AppState>,
    Json(body): Json<AddUrlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let list = state.core.store.list_add(&body.url, &body.name, body.kind())?;
    state.core.sync_filters_to_config().await;
    info!(id = list.id, url = %body.url, "Filter list added; refresh queued");

    // Fetch the new body in the background; the matcher rebuilds on success.
    let core = std::sync::Arc::clone(&state.core);
    tokio::spawn(async move {
        let _ = core.refresh_filters(KindMask::all(), false, true).await;
    });
    Ok(Json(serde_json::json!({ "id": list.id })))
}

#[instrument(skip(state), name = "api_filtering_remove_url")]
pub async fn remove_url(
    State(state): State<AppState>,
    Json(body): Json<RemoveUrlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.core.store.list_remove(&body.url)?;
    state.core.sync_filters_to_config().await;
    state.core.rebuild_filtering().await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_filtering_set_url")]
pub async fn set_url(
    State(state): State<AppState>,
    Json(body): Json<SetUrlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.core.store.list_set_properties(
        &body.url,
        &body.data.url,
        &body.data.name,
        body.data.enabled,
    )?;
    state.core.sync_filters_to_config().await;

    if updated.last_updated == 0 {
        // URL changed: the body must be re-downloaded.
        let core = std::sync::Arc::clone(&state.core);
        tokio::spawn(async move {
            let _ = core.refresh_filters(KindMask::all(), false, true).await;
        });
    } else {
        state.core.rebuild_filtering().await;
    }
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_filtering_refresh")]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let mask = if body.whitelist {
        KindMask {
            blocklists: false,
            allowlists: true,
        }
    } else {
        KindMask {
            blocklists: true,
            allowlists: false,
        }
    };
    let summary = state.core.refresh_filters(mask, true, false).await?;
    Ok(Json(RefreshResponse {
        updated: summary.updated,
    }))
}

#[instrument(skip(state, body), name = "api_filtering_set_rules")]
pub async fn set_rules(
    State(state): State<AppState>,
    Json(body): Json<SetRulesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.core.store.user_rules_set(body.rules);
    state.core.sync_filters_to_config().await;
    state.core.rebuild_filtering().await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_filtering_check_host")]
pub async fn check_host(
    State(state): State<AppState>,
    Query(query): Query<CheckHostQuery>,
) -> Result<Json<CheckHostResponse>, ApiError> {
    let qtype = match query.qtype.as_deref() {
        None => RecordType::A,
        Some(t) => RecordType::parse(t)
            .ok_or_else(|| ApiError::bad_request(format!("unknown qtype: {t}")))?,
    };
    let client = query
        .client
        .as_deref()
        .and_then(|name| state.core.registry.get_by_name(name));

    let decision = state
        .core
        .check_host(&query.name, qtype, client.as_deref());

    let response = match decision {
        Decision::Pass => CheckHostResponse {
            reason: "NotFilteredNotFound".into(),
            rule: None,
            filter_id: None,
            service_name: None,
        },
        Decision::Allow { rule, list_id } => CheckHostResponse {
            reason: "NotFilteredWhiteList".into(),
            rule: Some(rule.to_string()),
            filter_id: Some(list_id),
            service_name: None,
        },
        Decision::Block { rule, list_id } => CheckHostResponse {
            reason: "FilteredBlackList".into(),
            rule: Some(rule.to_string()),
            filter_id: Some(list_id),
            service_name: None,
        },
        Decision::BlockService { name, rule } => CheckHostResponse {
            reason: "FilteredBlockedService".into(),
            rule: Some(rule.to_string()),
            filter_id: None,
            service_name: Some(name.to_string()),
        },
        Decision::Rewrite(_) => CheckHostResponse {
            reason: "Rewritten".into(),
            rule: None,
            filter_id: None,
            service_name: None,
        },
    };
    Ok(Json(response))
}
