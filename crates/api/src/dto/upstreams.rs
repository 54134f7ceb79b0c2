use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Deserialize)]
pub struct UpstreamsConfigRequest {
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub bootstrap_dns: Vec<IpAddr>,
    #[serde(default)]
    pub all_servers: bool,
}

#[derive(Debug, Deserialize)]
pub struct TestUpstreamRequest {
    pub upstreams: Vec<String>,
}

/// Per-upstream probe outcome: "OK" or the error string.
#[derive(Debug, Serialize)]
pub struct TestUpstreamResponse(pub HashMap<String, String>);
