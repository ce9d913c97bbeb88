//! Dump file encoding (spec §4.8), grounded on
//! `original_source/.../logwriter.h`/`.cpp`'s `JsonLogWriter`.

use serde_json::{
    json,
    Value,
};
use sld_common::LogEntry;

pub struct EventLogWriter;

impl EventLogWriter {
    /// Writes one dump file holding the boot id, CID chain, and every
    /// event for that boot, in the order given.
    pub fn write<'a>(path: &str, boot_id: &str, cid: &str, next_cid: &str, events: impl Iterator<Item = &'a LogEntry>) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        let doc = json!({
            "schema_version": 1,
            "linux_boot_id": boot_id,
            "cid": cid,
            "next_cid": next_cid,
            "events": events.map(event_object).collect::<Vec<_>>(),
        });
        serde_json::to_writer(file, &doc)?;
        Ok(())
    }
}

fn event_object(entry: &LogEntry) -> Value {
    let ts_ms = entry.timestamp_ns as f64 / 1_000_000.0;
    let mut obj = serde_json::Map::new();
    obj.insert("ts".to_string(), json!(ts_ms));
    match serde_json::from_str::<Value>(&entry.blob) {
        Ok(data) => {
            let type_key = if entry.internal { "_type" } else { "type" };
            obj.insert(type_key.to_string(), json!(entry.r#type));
            obj.insert("data".to_string(), data);
        },
        Err(_) => {
            obj.insert("_type".to_string(), json!("invalid_data"));
            obj.insert(
                "data".to_string(),
                json!({ "original_type": entry.r#type, "original_data": entry.blob }),
            );
        },
    }
    Value::Object(obj)
}
