//! The periodic/triggered batch export loop (spec §4.4), grounded on
//! `original_source/.../dumper.h`/`.cpp`'s `Dumper::run`. Runs on a plain
//! OS thread rather than the teacher's async `Runtime::spawn` — nothing
//! here needs an executor, just a condvar-driven wait loop (spec §5).

mod logwriter;

use std::{
    sync::Arc,
    thread,
    time::{
        Duration,
        Instant,
    },
};

use parking_lot::{
    Condvar,
    Mutex,
    MutexGuard,
};
use sld_storage::Storage;

pub use crate::logwriter::EventLogWriter;

/// The external drop-sink contract (spec §6): accepts a dump tagged by
/// `tag` at `path`, returns whether it was durably accepted.
pub trait DropSink: Send + Sync {
    fn submit(&self, tag: &str, path: &str) -> bool;
}

/// The dump kind tag this component hands the sink; distinguishes an
/// event-log dump from the metric reports `sld-metrics` submits.
pub const EVENT_DUMP_TAG: &str = "structured_log";

struct State {
    terminated: bool,
    dump_immediately: bool,
    dump_old_entries_on_boot: bool,
    changing_period: bool,
    new_period_ms: u64,
    period_ms: u64,
    elapsed_adjustment_ms: u64,
}

pub struct Dumper {
    state: Mutex<State>,
    condvar: Condvar,
    storage: Arc<Storage>,
    sink: Arc<dyn DropSink>,
    dump_file_path: String,
    ready: Box<dyn Fn() -> bool + Send + Sync>,
    min_storage_threshold: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl Dumper {
    pub fn new(
        storage: Arc<Storage>,
        sink: Arc<dyn DropSink>,
        dump_file_path: impl Into<String>,
        period_ms: u64,
        ready: impl Fn() -> bool + Send + Sync + 'static,
        min_storage_threshold: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        Dumper {
            state: Mutex::new(State {
                terminated: false,
                dump_immediately: false,
                dump_old_entries_on_boot: true,
                changing_period: false,
                new_period_ms: period_ms,
                period_ms,
                elapsed_adjustment_ms: 0,
            }),
            condvar: Condvar::new(),
            storage,
            sink,
            dump_file_path: dump_file_path.into(),
            ready: Box::new(ready),
            min_storage_threshold: Box::new(min_storage_threshold),
        }
    }

    /// Runs the loop until `terminate()` is called. Intended to be the
    /// body of the daemon's Dumper thread.
    pub fn run(&self) {
        while let Some(skip_latest) = self.next_action() {
            if !(self.ready)() || self.storage.available_space() < (self.min_storage_threshold)() {
                continue;
            }
            self.perform_dump(skip_latest);
        }
    }

    pub fn trigger_dump(&self) {
        let mut state = self.state.lock();
        state.dump_immediately = true;
        self.condvar.notify_one();
    }

    pub fn change_dump_period(&self, new_period_ms: u64) {
        let mut state = self.state.lock();
        state.new_period_ms = new_period_ms;
        state.changing_period = true;
        self.condvar.notify_one();
    }

    pub fn terminate(&self) {
        let mut state = self.state.lock();
        state.terminated = true;
        self.condvar.notify_one();
    }

    /// Blocks until there is something to do. Returns `Some(skip_latest)`
    /// once a dump pass should run, `None` once terminated.
    fn next_action(&self) -> Option<bool> {
        let mut state = self.state.lock();
        loop {
            if state.terminated {
                return None;
            }
            if state.dump_immediately {
                state.dump_immediately = false;
                let skip_latest = state.dump_old_entries_on_boot;
                return Some(skip_latest);
            }
            if state.dump_old_entries_on_boot {
                if (self.ready)() {
                    state.dump_old_entries_on_boot = false;
                    return Some(true);
                }
                MutexGuard::unlocked(&mut state, || thread::sleep(Duration::from_secs(5)));
                continue;
            }

            let wait_ms = state.period_ms.saturating_sub(state.elapsed_adjustment_ms);
            let started = Instant::now();
            let _ = self.condvar.wait_for(&mut state, Duration::from_millis(wait_ms));
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if state.terminated {
                return None;
            }
            if state.changing_period {
                state.changing_period = false;
                state.period_ms = state.new_period_ms;
                if state.new_period_ms > elapsed_ms {
                    state.elapsed_adjustment_ms = state.new_period_ms - elapsed_ms;
                    continue;
                }
            }
            state.elapsed_adjustment_ms = 0;
            return Some(false);
        }
    }

    fn perform_dump(&self, skip_latest: bool) {
        let result = self.storage.dump(skip_latest, |view| {
            let (cid, next_cid) = view.cid_pair();
            let (cid, next_cid) = (cid.to_string(), next_cid.to_string());
            let events: Vec<_> = view.events().cloned().collect();
            if events.is_empty() {
                return Ok(());
            }
            EventLogWriter::write(&self.dump_file_path, view.boot_id(), &cid, &next_cid, events.iter())?;
            let accepted = self.sink.submit(EVENT_DUMP_TAG, &self.dump_file_path);
            if accepted {
                view.consume_cid()?;
            }
            let _ = std::fs::remove_file(&self.dump_file_path);
            Ok(())
        });
        if let Err(err) = result {
            tracing::error!(error = %err, "dump pass failed");
        }
    }
}
