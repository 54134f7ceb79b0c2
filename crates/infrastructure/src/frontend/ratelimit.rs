use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::net::IpAddr;
use std::time::Instant;

/// Per-client token bucket limiter. Buckets live in a sharded map keyed by
/// client IP; excess traffic is dropped by the caller, never answered.
pub struct RateLimiter {
    buckets: DashMap<IpAddr, Bucket, FxBuildHasher>,
    rps: u32,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rps` of 0 disables limiting.
    pub fn new(rps: u32) -> Self {
        Self {
            buckets: DashMap::with_hasher(FxBuildHasher),
            rps,
        }
    }

    pub fn allow(&self, ip: IpAddr) -> bool {
        if self.rps == 0 {
            return true;
        }
        let burst = self.rps as f64;
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: Instant::now(),
        });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps as f64).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
