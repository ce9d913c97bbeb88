//! Concrete report-rollup scenarios from spec §8, exercised end to end
//! against a real on-disk SQLite file via `tempfile`.

use std::sync::{
    atomic::{
        AtomicU64,
        Ordering,
    },
    Arc,
};

use sld_common::{
    AggregationKind,
    Aggregations,
    Clock,
    DataType,
    MetricKind,
    MetricValue,
};
use sld_storage::{
    MetricSampleInput,
    Storage,
};

struct FakeClock(AtomicU64, AtomicU64);

impl FakeClock {
    fn new() -> Self {
        Self(AtomicU64::new(0), AtomicU64::new(0))
    }
}

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

fn open_storage(dir: &tempfile::TempDir) -> Storage {
    let path = dir.path().join("structured.db");
    Storage::open(path.to_str().unwrap(), "boot-1", Arc::new(FakeClock::new())).unwrap()
}

fn sample(report_type: &str, event_name: &str, ts: i64, value: &str, aggregations: &[AggregationKind]) -> MetricSampleInput {
    let mut aggs = Aggregations::EMPTY;
    for a in aggregations {
        aggs.insert(*a);
    }
    MetricSampleInput {
        version: 2,
        report_type: report_type.to_string(),
        event_name: event_name.to_string(),
        timestamp_ms: ts,
        value: value.to_string(),
        data_type: DataType::Double,
        metric_type: MetricKind::Counter,
        carry_over: false,
        internal: false,
        aggregations: aggs,
    }
}

fn value_of<'a>(report: &'a sld_common::Report, name: &str) -> &'a MetricValue {
    &report.metrics.iter().find(|m| m.name == name).unwrap_or_else(|| panic!("missing metric {name}")).value
}

fn bool_sample(report_type: &str, event_name: &str, ts: i64, value: bool, aggregations: &[AggregationKind]) -> MetricSampleInput {
    let mut aggs = Aggregations::EMPTY;
    for a in aggregations {
        aggs.insert(*a);
    }
    MetricSampleInput {
        version: 2,
        report_type: report_type.to_string(),
        event_name: event_name.to_string(),
        timestamp_ms: ts,
        value: if value { "1" } else { "0" }.to_string(),
        data_type: DataType::Boolean,
        metric_type: MetricKind::Counter,
        carry_over: false,
        internal: false,
        aggregations: aggs,
    }
}

#[test]
fn boolean_sum_and_count_report_the_real_totals_not_a_truthy_collapse() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    for (ts, v) in [(0i64, true), (1000, true), (2000, false), (3000, true), (4000, true)] {
        storage
            .store_metric_sample(bool_sample("daily", "battery_charging", ts, v, &[AggregationKind::Sum, AggregationKind::Count, AggregationKind::Max, AggregationKind::Min]))
            .unwrap();
    }

    let report = storage.finish_report(2, "daily", 5000, false, false, |_| {}, |_| {}).unwrap().unwrap();

    assert_eq!(*value_of(&report, "battery_charging.sum"), MetricValue::Uint64(4));
    assert_eq!(*value_of(&report, "battery_charging.count"), MetricValue::Uint64(5));
    assert_eq!(*value_of(&report, "battery_charging.max"), MetricValue::Uint64(1));
    assert_eq!(*value_of(&report, "battery_charging.min"), MetricValue::Uint64(0));
}

#[test]
fn simple_counter_report_sums_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    for (ts, v) in [(0i64, "1.0"), (1000, "2.0"), (2000, "3.0")] {
        storage
            .store_metric_sample(sample("daily", "requests", ts, v, &[AggregationKind::Sum, AggregationKind::Count, AggregationKind::Mean]))
            .unwrap();
    }

    let report = storage
        .finish_report(2, "daily", 3000, false, false, |_| {}, |_| {})
        .unwrap()
        .expect("non-empty window reports Some");

    assert_eq!(report.start_timestamp_ms, 0);
    assert_eq!(report.end_timestamp_ms, 3000);
    assert_eq!(*value_of(&report, "requests.sum"), MetricValue::Double(6.0));
    assert_eq!(*value_of(&report, "requests.count"), MetricValue::Double(3.0));
    assert_eq!(*value_of(&report, "requests.mean"), MetricValue::Double(2.0));
}

#[test]
fn time_totals_attribute_intervals_to_the_preceding_state() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    // Window: [0, 10_000)ms. screen goes on at t=0, off at t=6_000.
    storage
        .store_metric_sample(sample("daily", "screen", 0, "1", &[AggregationKind::TimeTotals]))
        .unwrap();
    storage
        .store_metric_sample(sample("daily", "screen", 6_000, "0", &[AggregationKind::TimeTotals]))
        .unwrap();

    let report = storage.finish_report(2, "daily", 10_000, false, false, |_| {}, |_| {}).unwrap().unwrap();

    assert_eq!(*value_of(&report, "screen_1.total_secs"), MetricValue::Uint64(6));
    assert_eq!(*value_of(&report, "screen_0.total_secs"), MetricValue::Uint64(4));
}

#[test]
fn carry_over_reinserts_the_latest_value_into_the_next_window() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    let mut input = sample("daily", "battery_level", 0, "80", &[AggregationKind::LatestValue]);
    input.carry_over = true;
    storage.store_metric_sample(input).unwrap();

    let first = storage.finish_report(2, "daily", 1_000, true, false, |_| {}, |_| {}).unwrap().unwrap();
    assert_eq!(*value_of(&first, "battery_level.latest"), MetricValue::Double(80.0));

    // No new samples submitted; the carried-over value alone should
    // populate the next window's rollup.
    let second = storage.finish_report(2, "daily", 2_000, false, false, |_| {}, |_| {}).unwrap().unwrap();
    assert_eq!(second.start_timestamp_ms, 1_000);
    assert_eq!(*value_of(&second, "battery_level.latest"), MetricValue::Double(80.0));
}

#[test]
fn finishing_an_empty_window_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    let report = storage.finish_report(2, "daily", 1_000, false, false, |_| {}, |_| {}).unwrap();
    assert!(report.is_none());
}

#[test]
fn high_resolution_callbacks_fire_with_every_raw_sample() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir);

    storage
        .store_metric_sample(sample("daily", "requests", 0, "1.0", &[AggregationKind::Sum]))
        .unwrap();
    storage
        .store_metric_sample(sample("daily", "requests", 500, "2.0", &[AggregationKind::Sum]))
        .unwrap();

    let mut metas = Vec::new();
    let mut details = Vec::new();
    storage
        .finish_report(
            2,
            "daily",
            1_000,
            false,
            true,
            |meta| metas.push(meta),
            |detail| details.push(detail),
        )
        .unwrap();

    assert_eq!(metas.len(), 1);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].data.len(), 2);
}
