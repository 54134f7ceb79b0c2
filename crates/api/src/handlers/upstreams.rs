use crate::dto::{TestUpstreamRequest, TestUpstreamResponse, UpstreamsConfigRequest};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};
use warden_dns_application::ports::DnsExchanger;
use warden_dns_domain::UpstreamSets;
use warden_dns_infrastructure::upstream::UpstreamPool;

/// Name probed when testing candidate upstreams.
const PROBE_NAME: &str = "example.org.";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[instrument(skip(state, body), name = "api_set_upstreams")]
pub async fn set_config(
    State(state): State<AppState>,
    Json(body): Json<UpstreamsConfigRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Validate before touching anything; a bad spec must not take down the
    // running pool.
    UpstreamSets::parse(&body.upstreams)?;

    {
        let mut config = state.core.config.write().await;
        config.dns.upstreams = body.upstreams;
        if !body.bootstrap_dns.is_empty() {
            config.dns.bootstrap = body.bootstrap_dns;
        }
        config.dns.all_servers = body.all_servers;
    }
    state.core.reload_upstreams().await?;
    state.core.reload_runtime().await;
    state.core.save_config().await;
    info!("Upstream config replaced");
    Ok(Json(serde_json::json!({})))
}

#[instrument(skip(state, body), name = "api_test_upstreams")]
pub async fn test(
    State(state): State<AppState>,
    Json(body): Json<TestUpstreamRequest>,
) -> Result<Json<TestUpstreamResponse>, ApiError> {
    let bootstrap = {
        let config = state.core.config.read().await;
        config.dns.bootstrap.clone()
    };

    let mut results = HashMap::new();
    for spec in &body.upstreams {
        let outcome = probe(spec, &bootstrap).await;
        results.insert(spec.clone(), outcome);
    }
    Ok(Json(TestUpstreamResponse(results)))
}

async fn probe(spec: &str, bootstrap: &[std::net::IpAddr]) -> String {
    let sets = match UpstreamSets::parse(&[spec.to_string()]) {
        Ok(sets) => sets,
        Err(e) => return e.to_string(),
    };
    let pool = match UpstreamPool::build(&sets, bootstrap, false, PROBE_TIMEOUT.as_secs()) {
        Ok(pool) => pool,
        Err(e) => return e.to_string(),
    };

    let mut query = Message::new();
    query
        .set_id(0)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(
            Name::from_str(PROBE_NAME).expect("static probe name"),
            RecordType::A,
        ));

    match pool.exchange(&query, PROBE_TIMEOUT).await {
        Ok(_) => "OK".to_string(),
        Err(e) => e.to_string(),
    }
}
