//! Configuration for Warden DNS, organized by concern:
//! - `root`: top-level file, load/save, CLI overrides
//! - `server`: listener binding and ports
//! - `dns`: upstreams, rate limit, blocking mode
//! - `filtering`: filter lists, user rules, rewrites, safety toggles
//! - `access`: allow/deny lists
//! - `logging`: log settings
//! - `errors`: configuration errors

pub mod access;
pub mod dns;
pub mod errors;
pub mod filtering;
pub mod logging;
pub mod root;
pub mod server;

pub use access::AccessConfig;
pub use dns::DnsConfig;
pub use errors::ConfigError;
pub use filtering::FilteringConfig;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config, User};
pub use server::{ServerConfig, TlsConfig};
