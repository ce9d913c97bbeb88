//! Thin orchestration around `sld_storage::Storage::finish_report` (spec
//! §4.5), grounded on `original_source/.../metric_reporter.cpp`'s
//! `StoredReporter::finishReport`: the rollup math lives in `sld-storage`
//! since it needs the storage lock already held; this crate only formats
//! the two JSON documents and hands them to the drop sink.

mod format;

use std::sync::Arc;

use sld_common::{
    MetricDetail,
    ReportMetadata,
};
use sld_dumper::DropSink;
use sld_storage::Storage;

pub use crate::format::{
    format_high_resolution,
    format_low_resolution,
};

pub const METRIC_REPORT_TAG: &str = "structured_metrics";
pub const METRIC_REPORT_HD_TAG: &str = "structured_metrics_hd";

pub struct Reporter {
    storage: Arc<Storage>,
    sink: Arc<dyn DropSink>,
    report_path: String,
    hd_report_path: String,
}

impl Reporter {
    pub fn new(storage: Arc<Storage>, sink: Arc<dyn DropSink>, report_path: impl Into<String>, hd_report_path: impl Into<String>) -> Self {
        Reporter {
            storage,
            sink,
            report_path: report_path.into(),
            hd_report_path: hd_report_path.into(),
        }
    }

    /// Finishes the report window for `report_type` (spec §4.5). Returns
    /// `true` if a (non-empty) report was produced. The drop sink's
    /// return value is ignored for both files, unlike the event dump path
    /// (spec §6/§9: no retry on a metric report rejection).
    pub fn finish_report(&self, version: u8, report_type: &str, end_timestamp_ms: u64, start_next_report: bool, include_hd: bool) -> anyhow::Result<bool> {
        let mut hd_meta: Option<ReportMetadata> = None;
        let mut details: Vec<MetricDetail> = Vec::new();

        let report = self.storage.finish_report(
            version,
            report_type,
            end_timestamp_ms,
            start_next_report,
            include_hd,
            |meta| hd_meta = Some(meta),
            |detail| details.push(detail),
        )?;

        let Some(report) = report else {
            return Ok(false);
        };

        let low_res = format_low_resolution(&report);
        std::fs::write(&self.report_path, serde_json::to_vec(&low_res)?)?;
        self.sink.submit(METRIC_REPORT_TAG, &self.report_path);

        if include_hd {
            if let Some(meta) = hd_meta {
                let hd = format_high_resolution(&meta, &details);
                std::fs::write(&self.hd_report_path, serde_json::to_vec(&hd)?)?;
                self.sink.submit(METRIC_REPORT_HD_TAG, &self.hd_report_path);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Mutex,
    };

    use sld_common::{
        AggregationKind,
        Aggregations,
        Clock,
        DataType,
        MetricKind,
    };
    use sld_storage::MetricSampleInput;

    use super::*;

    struct FakeClock(AtomicUsize);

    impl Clock for FakeClock {
        fn monotonic_now_ms(&self) -> u64 {
            0
        }

        fn unix_now_ms(&self) -> u64 {
            0
        }

        fn new_cid(&self) -> String {
            format!("cid-{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    struct RecordingSink(Mutex<Vec<(String, String)>>);

    impl DropSink for RecordingSink {
        fn submit(&self, tag: &str, path: &str) -> bool {
            self.0.lock().unwrap().push((tag.to_string(), path.to_string()));
            true
        }
    }

    #[test]
    fn finish_report_writes_low_resolution_json_and_notifies_the_sink() {
        let storage = Arc::new(Storage::open(":memory:", "boot-1", Arc::new(FakeClock(AtomicUsize::new(0)))).unwrap());
        storage
            .store_metric_sample(MetricSampleInput {
                version: 2,
                report_type: "daily".to_string(),
                event_name: "boot".to_string(),
                timestamp_ms: 100,
                value: "1".to_string(),
                data_type: DataType::Double,
                metric_type: MetricKind::Counter,
                carry_over: false,
                internal: false,
                aggregations: {
                    let mut a = Aggregations::EMPTY;
                    a.insert(AggregationKind::Sum);
                    a
                },
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.json");
        let hd_path = dir.path().join("report_hd.json");
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let reporter = Reporter::new(storage, sink.clone(), report_path.to_str().unwrap().to_string(), hd_path.to_str().unwrap().to_string());

        let produced = reporter.finish_report(2, "daily", 400, false, false).unwrap();
        assert!(produced);

        let written = std::fs::read_to_string(&report_path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(doc["metrics"]["boot.sum"], 1.0);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn finish_report_on_an_empty_window_produces_nothing() {
        let storage = Arc::new(Storage::open(":memory:", "boot-1", Arc::new(FakeClock(AtomicUsize::new(0)))).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let reporter = Reporter::new(
            storage,
            sink.clone(),
            dir.path().join("report.json").to_str().unwrap().to_string(),
            dir.path().join("report_hd.json").to_str().unwrap().to_string(),
        );

        let produced = reporter.finish_report(2, "daily", 400, false, false).unwrap();
        assert!(!produced);
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
