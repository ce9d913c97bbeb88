//! Property tests for the quantified rate-limiter invariants in spec §8
//! (P1 bounded tokens, P2 refill/take accounting).

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use proptest::prelude::*;
use sld_common::Clock;
use sld_ratelimit::{
    RateLimiterConfig,
    TokenBucket,
};

struct SteppedClock(AtomicU64);

impl Clock for SteppedClock {
    fn monotonic_now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn unix_now_ms(&self) -> u64 {
        self.monotonic_now_ms()
    }

    fn new_cid(&self) -> String {
        unimplemented!()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Take(u32),
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..=10).prop_map(Op::Take),
        (0u64..=500).prop_map(Op::Advance),
    ]
}

proptest! {
    // P1: at any time tokens <= capacity, and take(n) never borrows from the future.
    #[test]
    fn tokens_never_exceed_capacity(
        capacity in 1u32..200,
        ms_per_token in 1u64..1000,
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let clock = Arc::new(SteppedClock(AtomicU64::new(0)));
        let bucket = TokenBucket::new(
            RateLimiterConfig { capacity, initial_capacity: capacity, ms_per_token },
            clock.clone(),
        );
        for op in ops {
            match op {
                Op::Take(n) => {
                    let _ = bucket.take(n);
                    prop_assert!(bucket.tokens() <= capacity);
                },
                Op::Advance(ms) => clock.0.fetch_add(ms, Ordering::SeqCst),
            }
        }
    }

    // P2: after take(n) succeeds, tokens decrease by exactly n (accounting
    // for the refill that necessarily preceded the deduction).
    #[test]
    fn take_success_deducts_exactly_n(
        capacity in 5u32..200,
        ms_per_token in 1u64..1000,
        amount in 1u32..5,
    ) {
        let clock = Arc::new(SteppedClock(AtomicU64::new(0)));
        let bucket = TokenBucket::new(
            RateLimiterConfig { capacity, initial_capacity: capacity, ms_per_token },
            clock,
        );
        let before = bucket.tokens();
        if bucket.take(amount) {
            prop_assert_eq!(bucket.tokens(), before - amount);
        }
    }
}

