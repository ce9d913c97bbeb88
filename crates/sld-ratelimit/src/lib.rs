//! Token-bucket admission gate guarding ingestion (spec §4.1).

use std::sync::Arc;

use parking_lot::Mutex;
use sld_common::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub capacity: u32,
    pub initial_capacity: u32,
    pub ms_per_token: u64,
}

struct Inner {
    tokens: u32,
    capacity: u32,
    ms_per_token: u64,
    last_feed_ms: u64,
}

/// A single token bucket. All operations take one internal lock, so callers
/// never block for longer than a refill-and-deduct (spec §5: "callers never
/// block more than briefly").
pub struct TokenBucket {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let last_feed_ms = clock.monotonic_now_ms();
        Self {
            clock,
            inner: Mutex::new(Inner {
                tokens: config.initial_capacity,
                capacity: config.capacity,
                ms_per_token: config.ms_per_token,
                last_feed_ms,
            }),
        }
    }

    /// Refills, then deducts `amount` if (and only if) it can be satisfied
    /// now without borrowing from a future refill.
    pub fn take(&self, amount: u32) -> bool {
        let mut inner = self.inner.lock();
        self.feed_locked(&mut inner);
        if inner.tokens < amount {
            false
        } else {
            inner.tokens -= amount;
            true
        }
    }

    fn feed_locked(&self, inner: &mut Inner) {
        if inner.ms_per_token == 0 {
            return;
        }
        let now = self.clock.monotonic_now_ms();
        let elapsed = now.saturating_sub(inner.last_feed_ms);
        let periods = elapsed / inner.ms_per_token;
        if periods == 0 {
            return;
        }
        inner.tokens = u32::try_from((inner.tokens as u64 + periods).min(inner.capacity as u64)).unwrap_or(inner.capacity);
        inner.last_feed_ms += periods * inner.ms_per_token;
    }

    /// Clamps the current token count into the new capacity and adopts the
    /// new capacity/period (spec §4.1).
    pub fn reconfigure(&self, config: RateLimiterConfig) {
        let mut inner = self.inner.lock();
        inner.tokens = inner.tokens.min(config.capacity);
        inner.capacity = config.capacity;
        inner.ms_per_token = config.ms_per_token;
    }

    pub fn tokens(&self) -> u32 {
        self.inner.lock().tokens
    }
}
