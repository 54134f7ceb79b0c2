//! Warden DNS Background Jobs
pub mod client_scan;
pub mod filter_refresh;

pub use client_scan::ClientScanJob;
pub use filter_refresh::FilterRefreshJob;
