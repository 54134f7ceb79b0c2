use crate::decision::FilterReason;
use crate::record_type::RecordType;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

/// One line in the query log sink.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogRecord {
    /// Unix milliseconds.
    pub ts: i64,
    pub client: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Arc<str>>,
    pub query: String,
    pub qtype: RecordType,
    /// Response rcode as text (NOERROR, NXDOMAIN, REFUSED, SERVFAIL...).
    pub response: String,
    pub reason: FilterReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Arc<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<Arc<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Arc<str>>,
    /// Total handling time in microseconds.
    pub elapsed_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One stats tick emitted alongside each log record.
#[derive(Debug, Clone, Copy)]
pub struct StatsTick {
    pub filtered: bool,
    pub safebrowsing: bool,
    pub parental: bool,
    pub service: bool,
    /// Upstream exchange time, if the query was forwarded.
    pub upstream_us: Option<u64>,
}
