//! The ingestion path (spec §4.7), grounded on
//! `original_source/.../structured_log.cpp`'s `StructuredLog::log`: admission
//! control (free space, rate limit), oversize recursion into a synthesized
//! `oversized_data` entry, and the dump-trigger event counter.

use std::sync::{
    atomic::{
        AtomicU32,
        Ordering,
    },
    Arc,
};

use sld_common::{
    Clock,
    LogEntry,
};
use sld_config::ConfigStore;
use sld_dumper::Dumper;
use sld_ratelimit::{
    RateLimiterConfig,
    TokenBucket,
};
use sld_storage::Storage;
use thiserror::Error;

/// The internal diagnostic event logged when `metric_service` rejects a
/// malformed payload, gated by its own rate limiter so a misbehaving
/// producer can't flood storage with rejection noise (spec §1.5/§9).
const REJECTED_EVENT_TYPE: &str = "structured_log_rejected";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("permission denied")]
    PermissionDenied,
}

pub struct Logger {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    config: Arc<ConfigStore>,
    rate_limiter: Arc<TokenBucket>,
    dumper: Arc<Dumper>,
    spammy_rate_limiter: TokenBucket,
    event_counter: AtomicU32,
}

impl Logger {
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>, config: Arc<ConfigStore>, rate_limiter: Arc<TokenBucket>, dumper: Arc<Dumper>) -> Self {
        let spammy_rate_limiter = TokenBucket::new(
            RateLimiterConfig { capacity: 5, initial_capacity: 1, ms_per_token: 720_000 },
            clock.clone(),
        );
        Logger {
            storage,
            clock,
            config,
            rate_limiter,
            dumper,
            spammy_rate_limiter,
            event_counter: AtomicU32::new(0),
        }
    }

    /// Ingests one event (spec §4.7). Never surfaces a per-event failure to
    /// the caller: every rejection path is a drop, logged at the level the
    /// condition warrants.
    pub fn log(&self, timestamp_ns: i64, r#type: &str, blob: &str, internal: bool) {
        self.log_impl(timestamp_ns, r#type, blob, internal, true);
    }

    fn log_impl(&self, timestamp_ns: i64, r#type: &str, blob: &str, internal: bool, allow_oversize_recursion: bool) {
        let cfg = self.config.current();

        if self.storage.available_space() < cfg.min_storage_threshold_bytes {
            tracing::error!(r#type, "dropping event: free space below min_storage_threshold");
            return;
        }
        if !self.rate_limiter.take(1) {
            return;
        }
        if allow_oversize_recursion && blob.len() > cfg.max_message_size_bytes {
            let synthesized = serde_json::json!({ "original_type": r#type, "size": blob.len() }).to_string();
            self.log_impl(timestamp_ns, "oversized_data", &synthesized, true, false);
            return;
        }

        if let Err(err) = self.storage.store_event(&LogEntry::new(timestamp_ns, r#type, blob, internal)) {
            tracing::error!(error = %err, r#type, "dropping event: storage write failed");
            return;
        }

        let count = self.event_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= cfg.num_events_before_dump {
            self.event_counter.store(0, Ordering::SeqCst);
            self.dumper.trigger_dump();
        }
    }

    /// Records that `metric_service` (or any other caller) rejected a
    /// malformed payload. Bypasses the primary admission path entirely: this
    /// is an internal diagnostic, gated solely by its own rate limiter so it
    /// can't itself exhaust storage or the ingestion limiter's budget.
    pub fn log_rejected(&self, reason: &str) {
        if !self.spammy_rate_limiter.take(1) {
            return;
        }
        let blob = serde_json::json!({ "reason": reason }).to_string();
        let timestamp_ns = (self.clock.unix_now_ms() as i64).saturating_mul(1_000_000);
        if let Err(err) = self.storage.store_event(&LogEntry::new(timestamp_ns, REJECTED_EVENT_TYPE, &blob, true)) {
            tracing::error!(error = %err, "dropping internal rejected-event diagnostic");
        }
    }

    /// Re-tunes the rate limiter and dump period from a freshly-persisted
    /// config document (spec §4.7's `reload_config`). The caller is
    /// responsible for checking whatever control capability gates this
    /// entry point; `has_control_capability` carries that decision through.
    pub fn reload_config(&self, json: &str, has_control_capability: bool) -> Result<(), DispatchError> {
        if !has_control_capability {
            return Err(DispatchError::PermissionDenied);
        }
        match self.config.update(json) {
            Ok(cfg) => {
                self.rate_limiter.reconfigure(RateLimiterConfig {
                    capacity: cfg.rate_limit_capacity,
                    initial_capacity: cfg.rate_limit_capacity,
                    ms_per_token: cfg.rate_limit_period_ms,
                });
                self.dumper.change_dump_period(cfg.dump_period_ms);
            },
            Err(err) => tracing::error!(error = %err, "reload_config: failed to persist config"),
        }
        Ok(())
    }
}
