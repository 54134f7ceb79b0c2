use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid upstream spec: {0}")]
    InvalidUpstream(String),

    #[error("Invalid rewrite: {0}")]
    InvalidRewrite(String),

    #[error("Invalid client: {0}")]
    InvalidClient(String),

    #[error("Filter list error: {0}")]
    FilterList(String),

    #[error("Refresh already running")]
    RefreshAlreadyRunning,

    #[error("Downloaded data is HTML, not filter rules")]
    DataIsHtml,

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Upstream exchange failed: {0}")]
    UpstreamFailure(String),

    #[error("All upstreams failed")]
    AllUpstreamsFailed,

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Bad credentials")]
    BadCredentials,

    #[error("Resource not found: {0}")]
    NotFound(String),
}
