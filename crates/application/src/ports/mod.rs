pub mod exchanger;
pub mod filter_engine;
pub mod leases;
pub mod sinks;

pub use exchanger::{DnsExchanger, ExchangeResult};
pub use filter_engine::{FilterContext, FilterEnginePort};
pub use leases::{EmptyLeaseTable, LeaseTable};
pub use sinks::{QueryLogSink, StatsSink};
