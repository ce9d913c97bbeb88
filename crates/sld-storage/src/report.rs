//! Metric sample storage and rollup computation (spec §4.5 steps 2-3, 5-6),
//! grounded on `storage.cpp`'s `collectMetricsLocked` (the split documented
//! in `SPEC_FULL.md` §3.4: rollup math lives here because it needs the lock
//! already held for `metric_samples`, while `sld-metrics::Reporter` is the
//! thin orchestration layer around this function).

use std::collections::BTreeMap;

use rusqlite::{
    params,
    OptionalExtension,
};
use sld_common::{
    AggregationKind,
    Aggregations,
    DataType,
    DatumValue,
    MetricDatum,
    MetricDetail,
    MetricKind,
    MetricValue,
    Report,
    ReportMetadata,
    RollupMetric,
};

use crate::Storage;

/// One metric sample as submitted by a producer (spec §4.6's `addValue`).
pub struct MetricSampleInput {
    pub version: u8,
    pub report_type: String,
    pub event_name: String,
    pub timestamp_ms: i64,
    /// Wire-encoded value: a formatted double, `"1"`/`"0"` for booleans, or
    /// the raw string for string-typed metrics.
    pub value: String,
    pub data_type: DataType,
    pub metric_type: MetricKind,
    pub carry_over: bool,
    pub internal: bool,
    pub aggregations: Aggregations,
}

struct MetricMetaRow {
    event_name: String,
    metric_type: MetricKind,
    data_type: DataType,
    carry_over: bool,
    aggregations: Aggregations,
    internal: bool,
}

impl Storage {
    /// Persists one metric sample, creating the metric's report window and
    /// metadata row if this is the first sample seen for either (spec
    /// §4.5 step 1 / §4.6's `addValue`). A repeated declaration of the same
    /// `(report_type, event_name)` overwrites its metadata; the last
    /// declaration wins.
    pub fn store_metric_sample(&self, input: MetricSampleInput) -> anyhow::Result<()> {
        let guard = self.conn.lock();
        let conn = &*guard;

        let window_exists: Option<i64> = conn
            .query_row("SELECT 1 FROM report_windows WHERE report_type = ?1", [&input.report_type], |row| row.get(0))
            .optional()?;
        if window_exists.is_none() {
            conn.execute(
                "INSERT INTO report_windows (report_type, start_timestamp_ms) VALUES (?1, ?2)",
                params![input.report_type, input.timestamp_ms],
            )?;
        }

        conn.execute(
            "INSERT INTO metric_metadata (report_type, event_name, metric_type, data_type, carry_over, aggregations, internal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (report_type, event_name) DO UPDATE SET
                metric_type = excluded.metric_type,
                data_type = excluded.data_type,
                carry_over = excluded.carry_over,
                aggregations = excluded.aggregations,
                internal = excluded.internal",
            params![
                input.report_type,
                input.event_name,
                input.metric_type.to_string(),
                input.data_type.to_string(),
                input.carry_over,
                input.aggregations.bits(),
                input.internal,
            ],
        )?;

        conn.execute(
            "INSERT INTO metric_samples (report_type, event_name, version, timestamp_ms, value) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![input.report_type, input.event_name, input.version, input.timestamp_ms, input.value],
        )?;
        Ok(())
    }

    /// Closes out the report window for `report_type` as of `end_timestamp_ms`
    /// (spec §4.5). Returns `None` if there is no open window, or it has no
    /// samples — an empty window is simply discarded, not reported.
    ///
    /// `report_meta_cb` fires once, before any metric detail, iff the window
    /// is non-empty and `include_hd` is set (the high-resolution preamble).
    /// `detail_cb` fires once per `(report_type, event_name)` with every
    /// raw sample, in insertion order, also gated on `include_hd`.
    pub fn finish_report(
        &self,
        version: u8,
        report_type: &str,
        end_timestamp_ms: u64,
        start_next_report: bool,
        include_hd: bool,
        mut report_meta_cb: impl FnMut(ReportMetadata),
        mut detail_cb: impl FnMut(MetricDetail),
    ) -> anyhow::Result<Option<Report>> {
        let guard = self.conn.lock();
        let conn = &*guard;

        let start_timestamp_ms: Option<i64> = conn
            .query_row("SELECT start_timestamp_ms FROM report_windows WHERE report_type = ?1", [report_type], |row| row.get(0))
            .optional()?;
        let sample_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metric_samples WHERE report_type = ?1",
            [report_type],
            |row| row.get(0),
        )?;

        let Some(start_timestamp_ms) = start_timestamp_ms.filter(|_| sample_count > 0) else {
            remove_report_state(conn, report_type)?;
            if start_next_report {
                conn.execute(
                    "INSERT INTO report_windows (report_type, start_timestamp_ms) VALUES (?1, ?2)",
                    params![report_type, end_timestamp_ms as i64],
                )?;
            }
            return Ok(None);
        };

        if include_hd {
            report_meta_cb(ReportMetadata {
                report_type: report_type.to_string(),
                start_timestamp_ms: start_timestamp_ms as u64,
                end_timestamp_ms,
            });
        }

        let metrics_meta = load_metric_metadata(conn, report_type)?;
        let mut rollups = Vec::new();
        let mut carry_over: Vec<(MetricMetaRow, i64, String)> = Vec::new();

        for meta in metrics_meta {
            let samples: Vec<(i64, String)> = {
                let mut stmt = conn.prepare(
                    "SELECT timestamp_ms, value FROM metric_samples
                     WHERE report_type = ?1 AND event_name = ?2 ORDER BY id ASC",
                )?;
                stmt.query_map(params![report_type, meta.event_name], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?
            };

            if include_hd {
                detail_cb(MetricDetail {
                    event_name: meta.event_name.clone(),
                    metric_type: meta.metric_type.to_string(),
                    data_type: meta.data_type.to_string(),
                    internal: meta.internal,
                    data: samples
                        .iter()
                        .map(|(ts, value)| MetricDatum {
                            timestamp_ms: *ts,
                            value: datum_value(meta.data_type, value),
                        })
                        .collect(),
                });
            }

            rollups.extend(compute_rollups(&meta, &samples, start_timestamp_ms as u64, end_timestamp_ms));

            if meta.carry_over {
                if let Some((last_ts, last_value)) = samples.last().cloned() {
                    carry_over.push((meta, last_ts, last_value));
                }
            }
        }

        remove_report_state(conn, report_type)?;

        let mut window_reopened = false;
        if !carry_over.is_empty() {
            conn.execute(
                "INSERT INTO report_windows (report_type, start_timestamp_ms) VALUES (?1, ?2)",
                params![report_type, end_timestamp_ms as i64],
            )?;
            window_reopened = true;
            for (meta, _last_ts, last_value) in carry_over {
                conn.execute(
                    "INSERT INTO metric_metadata (report_type, event_name, metric_type, data_type, carry_over, aggregations, internal)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        report_type,
                        meta.event_name,
                        meta.metric_type.to_string(),
                        meta.data_type.to_string(),
                        meta.carry_over,
                        meta.aggregations.bits(),
                        meta.internal,
                    ],
                )?;
                conn.execute(
                    "INSERT INTO metric_samples (report_type, event_name, version, timestamp_ms, value) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![report_type, meta.event_name, version, end_timestamp_ms as i64, last_value],
                )?;
            }
        }
        if start_next_report && !window_reopened {
            conn.execute(
                "INSERT INTO report_windows (report_type, start_timestamp_ms) VALUES (?1, ?2)",
                params![report_type, end_timestamp_ms as i64],
            )?;
        }

        Ok(Some(Report {
            version,
            report_type: report_type.to_string(),
            start_timestamp_ms: start_timestamp_ms as u64,
            end_timestamp_ms,
            metrics: rollups,
        }))
    }
}

fn remove_report_state(conn: &rusqlite::Connection, report_type: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM metric_samples WHERE report_type = ?1", [report_type])?;
    conn.execute("DELETE FROM metric_metadata WHERE report_type = ?1", [report_type])?;
    conn.execute("DELETE FROM report_windows WHERE report_type = ?1", [report_type])?;
    Ok(())
}

fn load_metric_metadata(conn: &rusqlite::Connection, report_type: &str) -> anyhow::Result<Vec<MetricMetaRow>> {
    let mut stmt = conn.prepare(
        "SELECT event_name, metric_type, data_type, carry_over, aggregations, internal
         FROM metric_metadata WHERE report_type = ?1",
    )?;
    let rows = stmt
        .query_map([report_type], |row| {
            let metric_type: String = row.get(1)?;
            let data_type: String = row.get(2)?;
            let aggregations: i64 = row.get(4)?;
            Ok((row.get::<_, String>(0)?, metric_type, data_type, row.get::<_, bool>(3)?, aggregations, row.get::<_, bool>(5)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(event_name, metric_type, data_type, carry_over, aggregations, internal)| {
            Some(MetricMetaRow {
                event_name,
                metric_type: metric_type.parse().ok()?,
                data_type: data_type.parse().ok()?,
                carry_over,
                aggregations: Aggregations::from_bits(aggregations as u16),
                internal,
            })
        })
        .collect())
}

fn datum_value(data_type: DataType, raw: &str) -> DatumValue {
    match data_type {
        DataType::Double => DatumValue::Number(raw.parse().unwrap_or(0.0)),
        DataType::Boolean => DatumValue::Boolean(raw != "0"),
        DataType::String => DatumValue::String(raw.to_string()),
    }
}

/// Casts a numeric aggregate back to the metric's declared type. For
/// `Boolean`, MIN/MAX/SUM/COUNT all feed real aggregated totals through
/// here (not just a current-state truth value, which MIN/MAX happen to
/// coincide with since every sample is 0.0 or 1.0) — round to the nearest
/// integer rather than collapsing to a truthy 0/1.
fn cast_original(data_type: DataType, x: f64) -> MetricValue {
    match data_type {
        DataType::Double => MetricValue::Double(x),
        DataType::Boolean => MetricValue::Uint64(x.round().max(0.0) as u64),
        DataType::String => MetricValue::String(format_number(x)),
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

fn compute_rollups(meta: &MetricMetaRow, samples: &[(i64, String)], start_ms: u64, end_ms: u64) -> Vec<RollupMetric> {
    let mut out = Vec::new();
    if samples.is_empty() {
        return out;
    }
    let values: Vec<f64> = samples.iter().map(|(_, v)| v.parse().unwrap_or(0.0)).collect();

    for kind in meta.aggregations.iter() {
        match kind {
            AggregationKind::Min => out.push(rollup(meta, kind, cast_original(meta.data_type, values.iter().cloned().fold(f64::INFINITY, f64::min)))),
            AggregationKind::Max => out.push(rollup(
                meta,
                kind,
                cast_original(meta.data_type, values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
            )),
            AggregationKind::Sum => out.push(rollup(meta, kind, cast_original(meta.data_type, values.iter().sum()))),
            AggregationKind::Mean => out.push(rollup(meta, kind, MetricValue::Double(values.iter().sum::<f64>() / values.len() as f64))),
            AggregationKind::Count => out.push(rollup(meta, kind, cast_original(meta.data_type, values.len() as f64))),
            AggregationKind::LatestValue => {
                let last = &samples.last().unwrap().1;
                let value = match meta.data_type {
                    DataType::Double => MetricValue::Double(last.parse().unwrap_or(0.0)),
                    DataType::Boolean => MetricValue::Uint64(if last != "0" { 1 } else { 0 }),
                    DataType::String => MetricValue::String(last.clone()),
                };
                out.push(rollup(meta, kind, value));
            },
            AggregationKind::TimeTotals => out.extend(time_state_rollups(meta, samples, start_ms, end_ms, false)),
            AggregationKind::TimePerHour => out.extend(time_state_rollups(meta, samples, start_ms, end_ms, true)),
        }
    }
    out
}

fn rollup(meta: &MetricMetaRow, kind: AggregationKind, value: MetricValue) -> RollupMetric {
    RollupMetric {
        name: format!("{}{}", meta.event_name, kind.suffix()),
        internal: meta.internal,
        value,
    }
}

/// `TIME_TOTALS`/`TIME_PER_HOUR`: attribute the interval between consecutive
/// samples to the state held during that interval (the value in force
/// *before* the transition), plus the trailing interval up to `end_ms` for
/// whichever state was last observed.
fn time_state_rollups(meta: &MetricMetaRow, samples: &[(i64, String)], start_ms: u64, end_ms: u64, per_hour: bool) -> Vec<RollupMetric> {
    let mut durations_ms: BTreeMap<String, i64> = BTreeMap::new();
    let mut prev_ts = start_ms as i64;
    let mut prev_state: Option<&str> = None;

    for (ts, value) in samples {
        if let Some(state) = prev_state {
            *durations_ms.entry(state.to_string()).or_insert(0) += ts - prev_ts;
        }
        prev_ts = *ts;
        prev_state = Some(value);
    }
    if let Some(state) = prev_state {
        *durations_ms.entry(state.to_string()).or_insert(0) += end_ms as i64 - prev_ts;
    }

    let suffix = if per_hour { AggregationKind::TimePerHour.suffix() } else { AggregationKind::TimeTotals.suffix() };
    let hours = ((end_ms as i64 - start_ms as i64) as f64 / 3_600_000.0).max(1.0);

    durations_ms
        .into_iter()
        .map(|(state, ms)| {
            let name = format!("{}_{}{}", meta.event_name, state, suffix);
            let value = if per_hour {
                MetricValue::Double((ms as f64 / 1000.0) / hours)
            } else {
                MetricValue::Uint64((ms.max(0) / 1000) as u64)
            };
            RollupMetric { name, internal: meta.internal, value }
        })
        .collect()
}
