//! JSON formatting for the low- and high-resolution report files (spec §6).

use serde_json::{
    json,
    Map,
    Value,
};
use sld_common::{
    MetricDetail,
    MetricValue,
    Report,
    ReportMetadata,
};

fn value_to_json(value: &MetricValue) -> Value {
    match value {
        MetricValue::Uint64(v) => json!(v),
        MetricValue::Int64(v) => json!(v),
        MetricValue::Double(v) => json!(v),
        MetricValue::String(v) => json!(v),
    }
}

/// The low-resolution summary (spec §6): public metrics and internal
/// metrics partitioned into separate objects, `internalMetrics` omitted
/// entirely when empty.
pub fn format_low_resolution(report: &Report) -> Value {
    let mut metrics = Map::new();
    let mut internal_metrics = Map::new();
    for metric in &report.metrics {
        let target = if metric.internal { &mut internal_metrics } else { &mut metrics };
        target.insert(metric.name.clone(), value_to_json(&metric.value));
    }

    let mut doc = Map::new();
    doc.insert("version".to_string(), json!(report.version));
    doc.insert("startTimestampMs".to_string(), json!(report.start_timestamp_ms));
    doc.insert("endTimestampMs".to_string(), json!(report.end_timestamp_ms));
    doc.insert("reportType".to_string(), json!(report.report_type.clone()));
    doc.insert("metrics".to_string(), Value::Object(metrics));
    if !internal_metrics.is_empty() {
        doc.insert("internalMetrics".to_string(), Value::Object(internal_metrics));
    }
    Value::Object(doc)
}

/// The high-resolution per-sample time series (spec §6). `string_key` in
/// each rollup's metadata is the event name; kept under that name for
/// parity with the original wire format.
pub fn format_high_resolution(meta: &ReportMetadata, details: &[MetricDetail]) -> Value {
    let rollups: Vec<Value> = details
        .iter()
        .map(|detail| {
            json!({
                "metadata": {
                    "string_key": detail.event_name.clone(),
                    "metric_type": detail.metric_type.clone(),
                    "data_type": detail.data_type.clone(),
                    "internal": detail.internal,
                },
                "data": detail.data.iter().map(|datum| {
                    json!({ "t": datum.timestamp_ms, "value": datum_to_json(&datum.value) })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "schema_version": 1,
        "start_time": meta.start_timestamp_ms,
        "duration_ms": meta.end_timestamp_ms.saturating_sub(meta.start_timestamp_ms),
        "report_type": meta.report_type.clone(),
        "producer": { "version": "1", "id": "structured_logd" },
        "rollups": rollups,
    })
}

fn datum_to_json(value: &sld_common::DatumValue) -> Value {
    match value {
        sld_common::DatumValue::Number(v) => json!(v),
        sld_common::DatumValue::Boolean(v) => json!(v),
        sld_common::DatumValue::String(v) => json!(v),
    }
}
