//! The storage engine (spec §4.3): a single SQLite connection guarded by a
//! reentrant lock, owning the event log, the boot/CID bookkeeping and the
//! metric rollup tables. Grounded on
//! `examples/original_source/MemfaultStructuredLogd/src/storage.h`/`.cpp`
//! and the teacher's `crates/sqlite/src/lib.rs` rusqlite idiom.

mod dump;
mod error;
mod migrate;
mod report;

use parking_lot::{
    Mutex,
    ReentrantMutex,
};
use rusqlite::{
    Connection,
    OptionalExtension,
};
use sld_common::{
    Clock,
    ConfigPersistence,
};
use std::sync::Arc;

pub use crate::dump::BootDumpView;
pub use crate::error::StorageError;
pub use crate::report::MetricSampleInput;

/// `storage.h`'s `kInMemoryAvailableSpace`: the free-space figure reported
/// for a non-file-backed (`:memory:` or test) database, since `statvfs`
/// has nothing to measure there.
pub const IN_MEMORY_AVAILABLE_SPACE: u64 = 2 * 1024 * 1024 * 1024;

pub struct Storage {
    conn: ReentrantMutex<Connection>,
    clock: Arc<dyn Clock>,
    boot_row_id: i64,
    db_path: Option<String>,
    empty_listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl Storage {
    /// Opens (creating if absent) the database at `path`, migrates it, and
    /// registers `boot_id` as a new boot row. `path` of `:memory:` is
    /// treated as a non-file-backed store for `available_space` purposes.
    pub fn open(path: &str, boot_id: &str, clock: Arc<dyn Clock>) -> anyhow::Result<Storage> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|err| StorageError::Unavailable(err.into()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate::migrate(&conn)?;

        let boot_row_id = register_boot(&conn, boot_id)?;
        dump::ensure_cids(&conn, clock.as_ref())?;

        Ok(Storage {
            conn: ReentrantMutex::new(conn),
            clock,
            boot_row_id,
            db_path: (path != ":memory:").then(|| path.to_string()),
            empty_listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn boot_row_id(&self) -> i64 {
        self.boot_row_id
    }

    /// Registers a callback invoked (on the calling thread, inside the
    /// storage lock) whenever a `dump` leaves the event log empty.
    pub fn add_empty_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.empty_listeners.lock().push(Box::new(listener));
    }

    fn notify_empty(&self) {
        for listener in self.empty_listeners.lock().iter() {
            listener();
        }
    }

    /// Free space available to the backing store. Real `statvfs(2)` query
    /// for a file-backed database, `IN_MEMORY_AVAILABLE_SPACE` otherwise.
    pub fn available_space(&self) -> u64 {
        let Some(path) = &self.db_path else {
            return IN_MEMORY_AVAILABLE_SPACE;
        };
        statvfs_available_bytes(path).unwrap_or(IN_MEMORY_AVAILABLE_SPACE)
    }
}

impl ConfigPersistence for Storage {
    fn get_config(&self) -> anyhow::Result<String> {
        let guard = self.conn.lock();
        let json: Option<String> = guard
            .query_row("SELECT json FROM config WHERE id = 0", [], |row| row.get(0))
            .ok();
        Ok(json.unwrap_or_default())
    }

    fn set_config(&self, json: &str) -> anyhow::Result<()> {
        let guard = self.conn.lock();
        guard.execute(
            "INSERT INTO config (id, json) VALUES (0, ?1)
             ON CONFLICT (id) DO UPDATE SET json = excluded.json",
            [json],
        )?;
        Ok(())
    }
}

/// `storage.cpp`'s `registerBoot`: reuse the most recent boot row if its
/// `uuid` already matches `boot_id` (the daemon restarting within the same
/// OS boot), otherwise insert a new row. `uuid` is `UNIQUE`, so inserting
/// unconditionally on a repeat boot id would fail.
fn register_boot(conn: &Connection, boot_id: &str) -> anyhow::Result<i64> {
    let last: Option<(i64, String)> = conn
        .query_row("SELECT id, uuid FROM boot_ids ORDER BY id DESC LIMIT 1", [], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    match last {
        Some((id, uuid)) if uuid == boot_id => Ok(id),
        _ => Ok(conn.query_row("INSERT INTO boot_ids (uuid) VALUES (?1) RETURNING id", [boot_id], |row| row.get(0))?),
    }
}

fn statvfs_available_bytes(path: &str) -> Option<u64> {
    use std::{
        ffi::CString,
        mem::MaybeUninit,
    };

    let dir = std::path::Path::new(path).parent().unwrap_or(std::path::Path::new("."));
    let c_path = CString::new(dir.to_str()?).ok()?;
    // SAFETY: `stat` is a valid, zero-initializable out-parameter for
    // `statvfs`; the call only reads `c_path`, a live NUL-terminated buffer.
    unsafe {
        let mut stat = MaybeUninit::<libc::statvfs>::zeroed();
        if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return None;
        }
        let stat = stat.assume_init();
        Some(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicU64,
        Ordering,
    };

    use super::*;

    pub(crate) struct FakeClock(AtomicU64, AtomicU64);

    impl FakeClock {
        pub(crate) fn new() -> Self {
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

    #[test]
    fn open_registers_a_boot_and_mints_a_cid_pair() {
        let storage = Storage::open(":memory:", "boot-a", Arc::new(FakeClock::new())).unwrap();
        assert_eq!(storage.boot_row_id(), 1);
        assert_eq!(storage.available_space(), IN_MEMORY_AVAILABLE_SPACE);
    }

    #[test]
    fn reopening_with_the_same_boot_id_reuses_the_boot_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("structured.db");
        let path = path.to_str().unwrap();

        let first = Storage::open(path, "boot-a", Arc::new(FakeClock::new())).unwrap();
        assert_eq!(first.boot_row_id(), 1);
        drop(first);

        let second = Storage::open(path, "boot-a", Arc::new(FakeClock::new())).unwrap();
        assert_eq!(second.boot_row_id(), 1, "restarting within the same boot must reuse the row, not violate uuid UNIQUE");

        let third = Storage::open(path, "boot-b", Arc::new(FakeClock::new())).unwrap();
        assert_eq!(third.boot_row_id(), 2, "a genuinely new boot id still gets a fresh row");
    }

    #[test]
    fn opening_an_unreachable_path_yields_a_typed_storage_error() {
        let err = Storage::open("/nonexistent-dir-for-this-test/structured.db", "boot-a", Arc::new(FakeClock::new())).unwrap_err();
        assert!(err.downcast_ref::<StorageError>().is_some(), "expected a StorageError::Unavailable, got {err:?}");
    }

    #[test]
    fn config_persistence_round_trips() {
        let storage = Storage::open(":memory:", "boot-a", Arc::new(FakeClock::new())).unwrap();
        assert_eq!(storage.get_config().unwrap(), "");
        storage.set_config(r#"{"a":1}"#).unwrap();
        assert_eq!(storage.get_config().unwrap(), r#"{"a":1}"#);
        storage.set_config(r#"{"a":2}"#).unwrap();
        assert_eq!(storage.get_config().unwrap(), r#"{"a":2}"#);
    }
}
