//! Warden DNS Domain Layer
pub mod blocking;
pub mod client;
pub mod config;
pub mod decision;
pub mod errors;
pub mod filter_list;
pub mod query_log;
pub mod record_type;
pub mod rewrite;
pub mod session;
pub mod stamps;
pub mod upstream;

pub use blocking::BlockingMode;
pub use client::{AutoClient, Client, ClientId, ClientSource, WhoisInfo};
pub use config::{CliOverrides, Config, ConfigError};
pub use decision::{Decision, FilterReason, MatchRequest};
pub use errors::DomainError;
pub use filter_list::{FilterKind, FilterList, USER_FILTER_ID};
pub use query_log::{QueryLogRecord, StatsTick};
pub use record_type::RecordType;
pub use rewrite::{Rewrite, RewriteAnswer, RewriteOutcome};
pub use session::Session;
pub use upstream::{UpstreamProto, UpstreamSets, UpstreamSpec};
