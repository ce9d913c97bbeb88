//! Forward-only schema migration keyed on `PRAGMA user_version`, following
//! `original_source/.../storage.cpp`'s `migrate()`/`getDbVersion()`/
//! `setDbVersion()`: read the version, apply every step above it in order,
//! then write the version back. Steps are additive and idempotent so a
//! migration can be re-run against a partially-migrated database safely.

use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const V1_INIT: &str = "
CREATE TABLE IF NOT EXISTS boot_ids (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cids (
    cid      TEXT NOT NULL,
    next_cid TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_ns INTEGER NOT NULL,
    type         TEXT NOT NULL,
    blob         TEXT NOT NULL,
    boot_row_id  INTEGER NOT NULL,
    internal     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS log_boot_row_id ON log (boot_row_id);

CREATE TABLE IF NOT EXISTS config (
    id   INTEGER PRIMARY KEY CHECK (id = 0),
    json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS report_windows (
    report_type        TEXT PRIMARY KEY,
    start_timestamp_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS metric_metadata (
    report_type  TEXT NOT NULL,
    event_name   TEXT NOT NULL,
    metric_type  TEXT NOT NULL,
    data_type    TEXT NOT NULL,
    carry_over   INTEGER NOT NULL,
    aggregations INTEGER NOT NULL,
    internal     INTEGER NOT NULL,
    PRIMARY KEY (report_type, event_name)
);

CREATE TABLE IF NOT EXISTS metric_samples (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    report_type  TEXT NOT NULL,
    event_name   TEXT NOT NULL,
    version      INTEGER NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    value        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS metric_samples_by_metric ON metric_samples (report_type, event_name, id);
";

pub(crate) fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    anyhow::ensure!(
        version <= SCHEMA_VERSION,
        "database schema version {version} is newer than this binary supports ({SCHEMA_VERSION})"
    );
    if version < 1 {
        conn.execute_batch(V1_INIT)?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
