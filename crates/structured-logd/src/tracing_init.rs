//! Operational logging for the daemon itself (not the structured log it
//! ingests). Grounded on the teacher's `cmd_util::env::config_service`:
//! stdout, compact by default, `LOG_FORMAT=json` for machine consumption,
//! level from `RUST_LOG` with an `info` floor, plus an optional
//! `STRUCTURED_LOGD_TRACE_FILE` non-blocking file sink for the same event
//! stream.

use std::fs::File;

use tracing_subscriber::{
    fmt::format::format,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Holds the `tracing-appender` worker guard; dropping it flushes the
/// background writer thread. Keep the returned guard alive for the
/// process lifetime.
pub struct TracingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init() -> TracingGuard {
    let format_layer = tracing_subscriber::fmt::layer().with_ansi(std::env::var("NO_COLOR").is_err());
    let format_layer = match std::env::var("LOG_FORMAT") {
        Ok(s) if s == "json" => format_layer.event_format(format().json()).boxed(),
        _ => format_layer.event_format(format().compact()).boxed(),
    };
    let format_layer = format_layer
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .boxed();

    let mut layers = vec![format_layer];
    let guard = match std::env::var("STRUCTURED_LOGD_TRACE_FILE") {
        Ok(path) => {
            let file = File::create(&path).unwrap_or_else(|err| panic!("could not create trace file {path}: {err}"));
            let (file_writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .boxed();
            layers.push(file_layer);
            Some(guard)
        },
        Err(_) => None,
    };

    tracing_subscriber::registry().with(layers).init();
    TracingGuard { _guard: guard }
}
