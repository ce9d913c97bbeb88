//! Bootstrap for the `structured-logd` daemon (spec.md §2 component 9).
//! Wires every crate together and runs the Dumper thread; no transport is
//! implemented (spec.md's Non-goals), so the JSON entry points in
//! `sld-service` and `sld-metrics::Reporter` are exercised only by whatever
//! embeds this binary's components directly, not by a server loop here.

mod config;
mod dropsink;
mod tracing_init;

use std::sync::Arc;

use clap::Parser;
use config::StructuredLogdConfig;
use dropsink::DirectoryDropSink;
use sld_common::SystemClock;
use sld_config::ConfigStore;
use sld_dumper::Dumper;
use sld_metrics::Reporter;
use sld_ratelimit::{
    RateLimiterConfig,
    TokenBucket,
};
use sld_service::{
    Logger,
    MetricService,
};
use sld_storage::Storage;

fn main() -> anyhow::Result<()> {
    let _trace_guard = tracing_init::init();
    let config = StructuredLogdConfig::parse();
    tracing::info!(?config, "starting structured-logd");

    let clock: Arc<dyn sld_common::Clock> = Arc::new(SystemClock::new());
    let boot_id = config.boot_id.clone().unwrap_or_else(|| clock.new_cid());
    let storage = Arc::new(Storage::open(&config.db_path, &boot_id, clock.clone())?);

    let config_store = Arc::new(ConfigStore::load(storage.clone())?);
    let runtime_config = config_store.current();

    let rate_limiter = Arc::new(TokenBucket::new(
        RateLimiterConfig {
            capacity: runtime_config.rate_limit_capacity,
            initial_capacity: runtime_config.rate_limit_capacity,
            ms_per_token: runtime_config.rate_limit_period_ms,
        },
        clock.clone(),
    ));

    let sink = Arc::new(DirectoryDropSink::new(config.drop_sink_dir.clone())?);

    let dumper = Arc::new(Dumper::new(
        storage.clone(),
        sink.clone(),
        config.dump_file_path.clone(),
        runtime_config.dump_period_ms,
        || true,
        {
            let config_store = config_store.clone();
            move || config_store.current().min_storage_threshold_bytes
        },
    ));

    let reporter = Arc::new(Reporter::new(storage.clone(), sink.clone(), config.report_path.clone(), config.hd_report_path.clone()));

    let logger = Arc::new(Logger::new(storage.clone(), clock.clone(), config_store.clone(), rate_limiter, dumper.clone()));
    let _metric_service = MetricService::new(storage.clone(), logger.clone(), config_store.clone(), reporter);

    let dumper_thread = {
        let dumper = dumper.clone();
        std::thread::spawn(move || dumper.run())
    };

    {
        let dumper = dumper.clone();
        ctrlc::set_handler(move || {
            tracing::info!("received shutdown signal, terminating dump loop");
            dumper.terminate();
        })?;
    }

    dumper_thread.join().map_err(|_| anyhow::anyhow!("dumper thread panicked"))?;
    tracing::info!("structured-logd exiting");
    Ok(())
}
