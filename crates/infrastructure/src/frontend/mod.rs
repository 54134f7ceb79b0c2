pub mod ecs;
pub mod handler;
pub mod pipeline;
pub mod ratelimit;
pub mod response;
pub mod server;

pub use handler::DnsHandler;
pub use ratelimit::RateLimiter;
pub use server::{DnsServer, ServerState, TlsSettings};
