pub mod engine;
pub mod matcher;
pub mod rewrites;
pub mod rules;
pub mod safe_browsing;
pub mod safe_search;
pub mod services;

pub use engine::{FilterEngine, FilteringSnapshot};
pub use matcher::{ListInput, RuleMatcher};
pub use rewrites::RewriteTable;
pub use safe_browsing::{HostSetFilter, SafetyHit};
pub use safe_search::SafeSearch;
pub use services::{service_exists, service_names, ServiceCatalog, SERVICES};
