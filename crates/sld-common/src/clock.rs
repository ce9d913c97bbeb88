use std::{
    sync::OnceLock,
    time::{
        Instant,
        SystemTime,
        UNIX_EPOCH,
    },
};

use uuid::Uuid;

/// Explicit clock and randomness seam, trimmed from the teacher's
/// `common::runtime::Runtime` trait down to what a thread-based (not async)
/// daemon needs: the Rate limiter and Storage engine take one of these
/// instead of calling `Instant::now`/`rand` directly, so tests can supply a
/// deterministic source.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds, for the Rate limiter's refill accounting.
    fn monotonic_now_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch, for timestamps the
    /// daemon itself stamps (e.g. metric sample timestamps it originates).
    fn unix_now_ms(&self) -> u64;

    /// A fresh opaque CID for the chain-of-dump identifier pair.
    fn new_cid(&self) -> String;
}

pub struct SystemClock {
    epoch: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            epoch: *MONOTONIC_EPOCH.get_or_init(Instant::now),
        }
    }
}

static MONOTONIC_EPOCH: OnceLock<Instant> = OnceLock::new();

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn monotonic_now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn unix_now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before the Unix epoch")
            .as_millis() as u64
    }

    fn new_cid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
