pub mod arp;
pub mod hosts_file;
pub mod registry;

pub use arp::ArpScanner;
pub use hosts_file::HostsFileScanner;
pub use registry::ClientRegistry;
