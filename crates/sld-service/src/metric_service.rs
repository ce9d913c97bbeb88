//! Parses the `addValue`/`finishReport` wire payloads (spec §4.6), grounded
//! on `original_source/.../metric_service.cpp`'s `isAddValueCompliantV1/V2`,
//! `isFinishCompliantV1`, `guessDataTypeFromAggregations` and `valueAsString`.
//! Malformed entries are dropped individually rather than failing the whole
//! batch, since a caller may submit an array mixing good and bad entries.

use serde_json::Value;
use sld_common::{
    AggregationKind,
    Aggregations,
    DataType,
    MetricKind,
};
use sld_storage::MetricSampleInput;

/// One parsed `finishReport` call.
pub struct FinishReportCall {
    pub version: u8,
    pub timestamp_ms: u64,
    pub report_type: String,
    pub start_next_report: bool,
}

/// One parsed `addValue` call, ready for `Storage::store_metric_sample`.
pub struct AddValueCall {
    pub sample: MetricSampleInput,
}

/// Accepts a single JSON object or an array of them; anything else (a bare
/// string, number, `null`) isn't a valid batch shape at all.
pub(crate) fn entries(json: &str) -> Option<Vec<Value>> {
    match serde_json::from_str(json).ok()? {
        Value::Array(items) => Some(items),
        obj @ Value::Object(_) => Some(vec![obj]),
        _ => None,
    }
}

/// Parses a `finishReport` payload. Used directly by tests and by whatever
/// owns the `Reporter` in the bootstrap binary; entries missing required
/// fields are dropped silently.
pub fn parse_finish_report(json: &str) -> Vec<FinishReportCall> {
    let Some(items) = entries(json) else {
        return Vec::new();
    };
    items.iter().filter_map(parse_one_finish_report).collect()
}

pub(crate) fn parse_one_finish_report(value: &Value) -> Option<FinishReportCall> {
    let version = value.get("version")?.as_u64()? as u8;
    let timestamp_ms = value.get("timestampMs")?.as_u64()?;
    let report_type = value.get("reportType")?.as_str()?.to_string();
    let start_next_report = value.get("startNextReport").and_then(Value::as_bool).unwrap_or(false);
    Some(FinishReportCall { version, timestamp_ms, report_type, start_next_report })
}

/// Parses an `addValue` payload (v1 or v2, object or array). Same
/// best-effort-drop semantics as `parse_finish_report`.
pub fn parse_add_value(json: &str) -> Vec<AddValueCall> {
    let Some(items) = entries(json) else {
        return Vec::new();
    };
    items.iter().filter_map(parse_one_add_value).collect()
}

pub(crate) fn parse_one_add_value(value: &Value) -> Option<AddValueCall> {
    let version = value.get("version")?.as_u64()? as u8;
    let timestamp_ms = value.get("timestampMs")?.as_i64()?;
    let report_type = value.get("reportType")?.as_str()?.to_string();
    let event_name = value.get("eventName")?.as_str()?.to_string();
    let raw_value = value.get("value")?;
    let internal = value.get("internal").and_then(Value::as_bool).unwrap_or(false);
    let aggregations = value
        .get("aggregations")
        .and_then(Value::as_array)
        .map(|items| Aggregations::from_wire_strings(items.iter().filter_map(Value::as_str)))
        .unwrap_or(Aggregations::EMPTY);

    let (data_type, metric_type, carry_over) = if version >= 2 {
        let data_type: DataType = value.get("dataType")?.as_str()?.parse().ok()?;
        let metric_type: MetricKind = value.get("metricType")?.as_str()?.parse().ok()?;
        let carry_over = value.get("carryOver")?.as_bool()?;
        (data_type, metric_type, carry_over)
    } else {
        let data_type = guess_data_type(raw_value)?;
        let metric_type = guess_metric_type(aggregations);
        (data_type, metric_type, false)
    };

    let wire_value = value_to_wire_string(raw_value)?;

    Some(AddValueCall {
        sample: MetricSampleInput {
            version,
            report_type,
            event_name,
            timestamp_ms,
            value: wire_value,
            data_type,
            metric_type,
            carry_over,
            internal,
            aggregations,
        },
    })
}

fn guess_data_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Number(_) => Some(DataType::Double),
        Value::String(_) => Some(DataType::String),
        Value::Bool(_) => Some(DataType::Boolean),
        _ => None,
    }
}

/// v1's `guessDataTypeFromAggregations` sibling: never yields
/// `MetricKind::Event`, which is only reachable through the explicit v2
/// `metricType` field.
fn guess_metric_type(aggregations: Aggregations) -> MetricKind {
    if aggregations.contains(AggregationKind::Count) {
        MetricKind::Counter
    } else if aggregations.contains(AggregationKind::Mean) || aggregations.contains(AggregationKind::Max) || aggregations.contains(AggregationKind::Sum) {
        MetricKind::Gauge
    } else {
        MetricKind::Property
    }
}

fn value_to_wire_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(format_number(n)),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        _ => None,
    }
}

fn format_number(n: &serde_json::Number) -> String {
    match n.as_i64() {
        Some(i) => i.to_string(),
        None => n.to_string(),
    }
}
