#![cfg(feature = "dns-over-https")]

use super::DnsTransport;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use warden_dns_domain::DomainError;

const DNS_MESSAGE_TYPE: &str = "application/dns-message";

/// DNS over HTTPS (RFC 8484), POST with `application/dns-message` bodies.
/// reqwest supplies HTTP/2 multiplexing and connection reuse.
pub struct HttpsTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpsTransport {
    /// `resolved` pins the server host to a bootstrap-resolved address so
    /// the exchange never depends on another resolver.
    pub fn new(
        host: &str,
        port: u16,
        path: &str,
        resolved: Option<SocketAddr>,
    ) -> Result<Self, DomainError> {
        let mut builder = reqwest::Client::builder()
            .user_agent("warden-dns/0.3")
            .timeout(Duration::from_secs(30))
            .http2_prior_knowledge();
        if let Some(addr) = resolved {
            builder = builder.resolve(host, addr);
        }
        let client = builder
            .build()
            .map_err(|e| DomainError::UpstreamFailure(format!("doh client: {e}")))?;

        let url = if port == 443 {
            format!("https://{host}{path}")
        } else {
            format!("https://{host}:{port}{path}")
        };

        Ok(Self { url, client })
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn send(&self, message_bytes: &[u8], timeout: Duration) -> Result<Vec<u8>, DomainError> {
        let exchange = async {
            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_TYPE)
                .header(reqwest::header::ACCEPT, DNS_MESSAGE_TYPE)
                .body(message_bytes.to_vec())
                .send()
                .await
                .map_err(|e| DomainError::UpstreamFailure(format!("doh post {}: {e}", self.url)))?;

            if !response.status().is_success() {
                return Err(DomainError::UpstreamFailure(format!(
                    "doh HTTP {} from {}",
                    response.status().as_u16(),
                    self.url
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| DomainError::UpstreamFailure(format!("doh body {}: {e}", self.url)))?;
            Ok(body.to_vec())
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DomainError::QueryTimeout)?
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }
}
