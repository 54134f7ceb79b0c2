//! Warden DNS Infrastructure Layer
//!
//! Concrete subsystems behind the application ports: the filtering engine,
//! the filter-list store and refresher, the upstream pool and transports,
//! access control, the client registry with its enrichment workers, the DNS
//! frontend, and the session store.
pub mod access;
pub mod clients;
pub mod core;
pub mod enrichment;
pub mod filtering;
pub mod filters;
pub mod frontend;
pub mod querylog;
pub mod sessions;
pub mod stats;
pub mod upstream;

pub use access::{AccessControl, AccessVerdict};
pub use core::{Core, RuntimeSettings};
pub use frontend::{DnsServer, ServerState, TlsSettings};
