//! CLI-level configuration: on-disk paths, not the dynamically-retunable
//! knobs `sld-config` owns. Shaped after the teacher's `LocalConfig`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[clap(version, author = "Memfault, Inc.")]
pub struct StructuredLogdConfig {
    /// SQLite database file (use ":memory:" for an ephemeral store)
    #[clap(long, default_value = "structured_log.sqlite3")]
    pub db_path: String,

    /// Scratch path the event dump is written to before being handed to the
    /// drop sink
    #[clap(long, default_value = "/tmp/structured_log.json")]
    pub dump_file_path: String,

    /// Scratch path the low-resolution metric report is written to
    #[clap(long, default_value = "/tmp/structured_metrics.json")]
    pub report_path: String,

    /// Scratch path the high-resolution metric report is written to
    #[clap(long, default_value = "/tmp/structured_metrics_hd.json")]
    pub hd_report_path: String,

    /// Directory the default drop sink moves accepted dumps into
    #[clap(long, default_value = "/var/lib/structured_logd/drop_sink")]
    pub drop_sink_dir: PathBuf,

    /// This boot's identifier (spec: a caller-supplied opaque string,
    /// stable for the lifetime of this process)
    #[clap(long)]
    pub boot_id: Option<String>,
}
