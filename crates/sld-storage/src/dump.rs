//! Event log storage, boot bookkeeping and the CID chain (spec §4.3/§4.4),
//! grounded on `storage.cpp`'s `store`/`dump`/`registerBoot`/`ensureCids`/
//! `generateCid`/`consumeCid`/`getCidPair`.

use rusqlite::{
    params,
    Connection,
    OptionalExtension,
};
use sld_common::{
    Clock,
    LogEntry,
};

use crate::Storage;

pub(crate) fn ensure_cids(conn: &Connection, clock: &dyn Clock) -> anyhow::Result<()> {
    let exists: Option<i64> = conn.query_row("SELECT 1 FROM cids LIMIT 1", [], |row| row.get(0)).optional()?;
    if exists.is_none() {
        conn.execute(
            "INSERT INTO cids (cid, next_cid) VALUES (?1, ?2)",
            params![clock.new_cid(), clock.new_cid()],
        )?;
    }
    Ok(())
}

fn cid_pair(conn: &Connection) -> anyhow::Result<(String, String)> {
    Ok(conn.query_row("SELECT cid, next_cid FROM cids LIMIT 1", [], |row| Ok((row.get(0)?, row.get(1)?)))?)
}

impl Storage {
    /// Appends one entry to the current boot's log. The entry's
    /// `boot_row_id` is overwritten with this storage's own boot row id;
    /// callers never need to set it.
    pub fn store_event(&self, entry: &LogEntry) -> anyhow::Result<()> {
        let guard = self.conn.lock();
        guard.execute(
            "INSERT INTO log (timestamp_ns, type, blob, boot_row_id, internal) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry.timestamp_ns, entry.r#type, entry.blob, self.boot_row_id, entry.internal],
        )?;
        Ok(())
    }

    /// Visits every boot with stored events, oldest first. `skip_latest`
    /// excludes the current (most recent) boot, for the "only flush prior
    /// boots on startup" dump pass. After the visitor returns, that boot's
    /// event rows are deleted regardless of whether it consumed the CID.
    pub fn dump(&self, skip_latest: bool, mut visitor: impl FnMut(&mut BootDumpView<'_>) -> anyhow::Result<()>) -> anyhow::Result<()> {
        let guard = self.conn.lock();
        let conn: &Connection = &guard;

        let boots: Vec<(i64, String)> = {
            let query = if skip_latest {
                "SELECT b.id, b.uuid FROM boot_ids b
                 WHERE EXISTS (SELECT 1 FROM log WHERE log.boot_row_id = b.id)
                   AND b.id < (SELECT MAX(id) FROM boot_ids)
                 ORDER BY b.id ASC"
            } else {
                "SELECT b.id, b.uuid FROM boot_ids b
                 WHERE EXISTS (SELECT 1 FROM log WHERE log.boot_row_id = b.id)
                 ORDER BY b.id ASC"
            };
            let mut stmt = conn.prepare(query)?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<Result<Vec<_>, _>>()?
        };

        for (boot_row_id, boot_uuid) in boots {
            let mut stmt = conn.prepare(
                "SELECT timestamp_ns, type, blob, boot_row_id, internal FROM log
                 WHERE boot_row_id = ?1 ORDER BY timestamp_ns ASC, id ASC",
            )?;
            let events = stmt
                .query_map(params![boot_row_id], |row| {
                    Ok(LogEntry {
                        timestamp_ns: row.get(0)?,
                        r#type: row.get(1)?,
                        blob: row.get(2)?,
                        boot_row_id: row.get(3)?,
                        internal: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            let pair = cid_pair(conn)?;

            let mut view = BootDumpView {
                storage: self,
                conn,
                boot_row_id,
                boot_uuid,
                pair,
                events,
            };
            visitor(&mut view)?;

            conn.execute("DELETE FROM log WHERE boot_row_id = ?1", params![boot_row_id])?;
        }

        conn.execute(
            "DELETE FROM boot_ids WHERE id < (SELECT MAX(id) FROM boot_ids)
               AND NOT EXISTS (SELECT 1 FROM log WHERE log.boot_row_id = boot_ids.id)",
            [],
        )?;
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM log", [], |row| row.get(0))?;
        if remaining == 0 {
            self.notify_empty();
        }
        Ok(())
    }
}

/// A read/consume view onto one boot's pending events, handed to the
/// `dump` visitor. Mirrors `storage.h`'s `BootIdDumpView`.
pub struct BootDumpView<'a> {
    storage: &'a Storage,
    conn: &'a Connection,
    boot_row_id: i64,
    boot_uuid: String,
    pair: (String, String),
    events: Vec<LogEntry>,
}

impl<'a> BootDumpView<'a> {
    pub fn boot_id(&self) -> &str {
        &self.boot_uuid
    }

    pub fn cid_pair(&self) -> (&str, &str) {
        (&self.pair.0, &self.pair.1)
    }

    pub fn events(&self) -> impl Iterator<Item = &LogEntry> {
        self.events.iter()
    }

    pub fn boot_row_id(&self) -> i64 {
        self.boot_row_id
    }

    /// Advances the CID chain: `next_cid` becomes the new `cid`, and a
    /// fresh `next_cid` is minted. Idempotent within one view (later calls
    /// simply mint the chain forward again).
    pub fn consume_cid(&mut self) -> anyhow::Result<()> {
        let new_cid = self.pair.1.clone();
        let new_next = self.storage.clock.new_cid();
        self.conn
            .execute("UPDATE cids SET cid = ?1, next_cid = ?2", params![new_cid, new_next])?;
        self.pair = (new_cid, new_next);
        Ok(())
    }
}
