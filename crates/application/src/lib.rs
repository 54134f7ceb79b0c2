//! Warden DNS Application Layer
//!
//! Ports (traits) crossed by the data plane and the control plane. The
//! infrastructure crate supplies the implementations; tests supply mocks.
pub mod ports;

pub use ports::{
    DnsExchanger, EmptyLeaseTable, ExchangeResult, FilterContext, FilterEnginePort, LeaseTable,
    QueryLogSink, StatsSink,
};
