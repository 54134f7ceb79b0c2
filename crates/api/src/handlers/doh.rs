use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hickory_proto::op::Message;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;
use warden_dns_infrastructure::frontend::pipeline;

const DNS_MESSAGE_TYPE: &str = "application/dns-message";

#[derive(Debug, Deserialize)]
pub struct DohQuery {
    pub dns: String,
}

/// RFC 8484 GET: the query rides base64url in the `dns` parameter.
pub async fn get(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<DohQuery>,
) -> Response {
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(query.dns.as_bytes()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    answer(state, peer, headers, &bytes).await
}

/// RFC 8484 POST with an `application/dns-message` body.
pub async fn post(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    answer(state, peer, headers, &body).await
}

async fn answer(state: AppState, peer: SocketAddr, headers: HeaderMap, raw: &[u8]) -> Response {
    let Ok(query) = Message::from_vec(raw) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let client_ip = effective_client_ip(&state, peer.ip(), &headers).await;

    match pipeline::handle_query(&state.core, query, client_ip, None).await {
        Some(response) => match response.to_vec() {
            Ok(bytes) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, DNS_MESSAGE_TYPE)],
                bytes,
            )
                .into_response(),
            Err(e) => {
                debug!(error = %e, "DoH response encoding failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        // Rate-limited: there is a connection to answer on, so 429 it.
        None => StatusCode::TOO_MANY_REQUESTS.into_response(),
    }
}

/// X-Forwarded-For is honored only when the direct peer is a configured
/// trusted proxy.
async fn effective_client_ip(state: &AppState, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
    let proxies: Vec<IpNetwork> = {
        let config = state.core.config.read().await;
        config
            .dns
            .trusted_proxies
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect()
    };
    if !proxies.iter().any(|net| net.contains(peer)) {
        return peer;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
}
