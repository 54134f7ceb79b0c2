use crate::dto::{ClientDeleteRequest, ClientFindQuery, ClientUpdateRequest, ClientsResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use std::net::IpAddr;
use tracing::instrument;
use warden_dns_domain::Client;

async fn persist(state: &AppState) {
    let manual: Vec<Client> = state
        .core
        .registry
        .list_manual()
        .iter()
        .map(|c| (**c).clone())
        .collect();
    {
        let mut config = state.core.config.write().await;
        config.clients = manual;
    }
    state.core.save_config().await;
}

#[instrument(skip(state), name = "api_clients_list")]
pub async fn list(State(state): State<AppState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state
            .core
            .registry
            .list_manual()
            .iter()
            .map(|c| (**c).clone())
            .collect(),
        auto_clients: state.core.registry.list_auto(),
    })
}

#[instrument(skip(state, body), name = "api_clients_add")]
pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<Client>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut clients: Vec<Client> = state
        .core
        .registry
        .list_manual()
        .iter()
        .map(|c| (**c).clone())
        .collect();
    clients.push(body);
    state.core.registry.replace_manual(clients)?;
    persist(&state).await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state, body), name = "api_clients_update")]
pub async fn update(
    State(state): State<AppState>,
    Json(body): Json<ClientUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut clients: Vec<Client> = state
        .core
        .registry
        .list_manual()
        .iter()
        .map(|c| (**c).clone())
        .collect();
    let slot = clients
        .iter_mut()
        .find(|c| c.name == body.name)
        .ok_or_else(|| ApiError::bad_request(format!("no such client: {}", body.name)))?;
    *slot = body.data;
    state.core.registry.replace_manual(clients)?;
    persist(&state).await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_clients_delete")]
pub async fn delete(
    State(state): State<AppState>,
    Json(body): Json<ClientDeleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut clients: Vec<Client> = state
        .core
        .registry
        .list_manual()
        .iter()
        .map(|c| (**c).clone())
        .collect();
    let before = clients.len();
    clients.retain(|c| c.name != body.name);
    if clients.len() == before {
        return Err(ApiError::bad_request(format!(
            "no such client: {}",
            body.name
        )));
    }
    state.core.registry.replace_manual(clients)?;
    persist(&state).await;
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state), name = "api_clients_find")]
pub async fn find(
    State(state): State<AppState>,
    Query(query): Query<ClientFindQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip: IpAddr = query
        .ip0
        .parse()
        .map_err(|_| ApiError::bad_request(format!("bad ip: {}", query.ip0)))?;

    let mut found = serde_json::Map::new();
    if let Some(client) = state.core.registry.find(ip, None) {
        found.insert(
            query.ip0.clone(),
            serde_json::to_value(&*client).unwrap_or_default(),
        );
    } else if let Some(auto) = state.core.registry.find_auto(ip) {
        found.insert(query.ip0.clone(), serde_json::to_value(auto).unwrap_or_default());
    }
    Ok(Json(serde_json::Value::Object(found)))
}
