//! P3 from spec §8: for any `(report_type, event_name)`, the sample sequence
//! observed by `finish_report`'s high-resolution detail callback equals
//! insertion order, regardless of how the samples' own timestamps compare.

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use proptest::prelude::*;
use sld_common::{
    AggregationKind,
    Aggregations,
    Clock,
    DataType,
    MetricKind,
};
use sld_storage::{
    MetricSampleInput,
    Storage,
};

struct FakeClock(AtomicU64, AtomicU64);

impl Clock for FakeClock {
    fn monotonic_now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn unix_now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn new_cid(&self) -> String {
        format!("cid-{}", self.1.fetch_add(1, Ordering::SeqCst))
    }
}

fn sample(ts: i64, v: i64) -> MetricSampleInput {
    let mut aggregations = Aggregations::EMPTY;
    aggregations.insert(AggregationKind::Sum);
    MetricSampleInput {
        version: 2,
        report_type: "daily".to_string(),
        event_name: "metric".to_string(),
        timestamp_ms: ts,
        value: v.to_string(),
        data_type: DataType::Double,
        metric_type: MetricKind::Gauge,
        carry_over: false,
        internal: false,
        aggregations,
    }
}

proptest! {
    #[test]
    fn detail_samples_observe_insertion_order_not_timestamp_order(
        entries in prop::collection::vec((-1_000_000i64..1_000_000, 0i64..1_000), 1..50),
    ) {
        let storage = Storage::open(":memory:", "boot-1", Arc::new(FakeClock(AtomicU64::new(0), AtomicU64::new(0)))).unwrap();
        for &(ts, v) in &entries {
            storage.store_metric_sample(sample(ts, v)).unwrap();
        }

        let mut details = Vec::new();
        storage
            .finish_report(2, "daily", 2_000_000, false, true, |_| {}, |d| details.push(d))
            .unwrap();

        prop_assert_eq!(details.len(), 1);
        let observed: Vec<i64> = details[0].data.iter().map(|d| d.timestamp_ms).collect();
        let expected: Vec<i64> = entries.iter().map(|&(ts, _)| ts).collect();
        prop_assert_eq!(observed, expected);
    }
}
