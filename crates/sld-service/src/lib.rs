//! The two JSON-facing service entry points (spec §4.6/§4.7): `metric_service`
//! parses and validates `addValue`/`finishReport` payloads; `logger` is the
//! event ingestion path plus config reload. Kept as two modules rather than
//! one, mirroring how the original keeps `StructuredLog` and
//! `MetricService` as separate classes sharing nothing but `Storage`.

pub mod logger;
pub mod metric_service;

use std::sync::Arc;

pub use crate::{
    logger::{
        DispatchError,
        Logger,
    },
    metric_service::{
        parse_add_value,
        parse_finish_report,
        AddValueCall,
        FinishReportCall,
    },
};
use sld_config::ConfigStore;
use sld_metrics::Reporter;
use sld_storage::Storage;

/// Thin façade over `metric_service::parse_add_value`/`parse_finish_report`
/// that also wires in the rejection diagnostic (spec §1.5/§9) and the
/// `metric_report_enabled` gate (spec §4.2): when reporting is disabled the
/// whole batch is a silent no-op, not a rejection.
pub struct MetricService {
    storage: Arc<Storage>,
    logger: Arc<Logger>,
    config: Arc<ConfigStore>,
    reporter: Arc<Reporter>,
}

impl MetricService {
    pub fn new(storage: Arc<Storage>, logger: Arc<Logger>, config: Arc<ConfigStore>, reporter: Arc<Reporter>) -> Self {
        MetricService { storage, logger, config, reporter }
    }

    /// Handles one `addValue` call (object or array of objects). Malformed
    /// entries are dropped and reported via the logger's rejection
    /// diagnostic; well-formed ones are written straight through to storage.
    pub fn add_value(&self, json: &str) {
        if !self.config.current().metric_report_enabled {
            return;
        }
        let Some(items) = metric_service::entries(json) else {
            self.logger.log_rejected("add_value payload was not a JSON object or array");
            return;
        };
        for item in &items {
            match metric_service::parse_one_add_value(item) {
                Some(call) => {
                    if let Err(err) = self.storage.store_metric_sample(call.sample) {
                        tracing::error!(error = %err, "dropping metric sample: storage write failed");
                    }
                },
                None => self.logger.log_rejected("malformed add_value entry"),
            }
        }
    }

    /// Handles one `finishReport` call (object or array of objects, spec
    /// §4.6's `isFinishCompliantV1`). Closes the named report window via
    /// `sld_metrics::Reporter::finish_report`, gated the same way
    /// `add_value` is on `metric_report_enabled` and the rejection
    /// diagnostic.
    pub fn finish_report(&self, json: &str) {
        if !self.config.current().metric_report_enabled {
            return;
        }
        let Some(items) = metric_service::entries(json) else {
            self.logger.log_rejected("finish_report payload was not a JSON object or array");
            return;
        };
        let include_hd = self.config.current().high_res_metrics_enabled;
        for item in &items {
            match metric_service::parse_one_finish_report(item) {
                Some(call) => {
                    if let Err(err) = self.reporter.finish_report(call.version, &call.report_type, call.timestamp_ms, call.start_next_report, include_hd) {
                        tracing::error!(error = %err, report_type = %call.report_type, "finish_report failed");
                    }
                },
                None => self.logger.log_rejected("malformed finish_report entry"),
            }
        }
    }
}
