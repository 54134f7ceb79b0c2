pub mod bootstrap;
pub mod pool;
pub mod transport;

pub use bootstrap::Bootstrap;
pub use pool::{Upstream, UpstreamPool};
