pub mod clients;
pub mod filtering;
pub mod upstreams;

pub use clients::*;
pub use filtering::*;
pub use upstreams::*;
