use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use warden_dns_application::ports::StatsSink;
use warden_dns_domain::StatsTick;

/// Upper bounds of the upstream latency buckets, microseconds. The last
/// bucket is unbounded.
const LATENCY_BOUNDS_US: [u64; 6] = [1_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

/// In-memory counters, one tick per handled query.
pub struct StatsCounters {
    queries: AtomicU64,
    filtered: AtomicU64,
    safebrowsing: AtomicU64,
    parental: AtomicU64,
    services: AtomicU64,
    latency_buckets: [AtomicU64; 7],
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            queries: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            safebrowsing: AtomicU64::new(0),
            parental: AtomicU64::new(0),
            services: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub queries: u64,
    pub filtered: u64,
    pub safebrowsing: u64,
    pub parental: u64,
    pub services: u64,
    pub latency_buckets: Vec<u64>,
}

impl StatsCounters {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            safebrowsing: self.safebrowsing.load(Ordering::Relaxed),
            parental: self.parental.load(Ordering::Relaxed),
            services: self.services.load(Ordering::Relaxed),
            latency_buckets: self
                .latency_buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

impl StatsSink for StatsCounters {
    fn tick(&self, tick: StatsTick) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if tick.filtered {
            self.filtered.fetch_add(1, Ordering::Relaxed);
        }
        if tick.safebrowsing {
            self.safebrowsing.fetch_add(1, Ordering::Relaxed);
        }
        if tick.parental {
            self.parental.fetch_add(1, Ordering::Relaxed);
        }
        if tick.service {
            self.services.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(us) = tick.upstream_us {
            let bucket = LATENCY_BOUNDS_US
                .iter()
                .position(|&bound| us <= bound)
                .unwrap_or(LATENCY_BOUNDS_US.len());
            self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        }
    }
}
