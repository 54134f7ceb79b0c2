use async_trait::async_trait;
use hickory_proto::op::Message;
use std::time::Duration;
use warden_dns_domain::DomainError;

/// The minimal upstream capability: send one DNS message, get one back
/// within the deadline. The upstream pool implements this over its grouped
/// transports; tests implement it in memory.
#[async_trait]
pub trait DnsExchanger: Send + Sync {
    async fn exchange(
        &self,
        query: &Message,
        deadline: Duration,
    ) -> Result<ExchangeResult, DomainError>;
}

/// A response plus where it came from, for the query log.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub response: Message,
    /// Display address of the upstream that answered.
    pub upstream: std::sync::Arc<str>,
    pub elapsed: Duration,
}
