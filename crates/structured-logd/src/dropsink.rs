//! Default `DropSink`: moves an accepted dump into a configured directory.
//! Stands in for the external drop sink of spec.md §1, which is out of
//! scope; this is only here to exercise the Dumper/Reporter end-to-end.

use std::path::{
    Path,
    PathBuf,
};

use sld_dumper::DropSink;

pub struct DirectoryDropSink {
    dir: PathBuf,
}

impl DirectoryDropSink {
    pub fn new(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(DirectoryDropSink { dir })
    }
}

impl DropSink for DirectoryDropSink {
    fn submit(&self, tag: &str, path: &str) -> bool {
        let source = Path::new(path);
        let Some(file_name) = source.file_name() else {
            tracing::error!(path, "drop sink: dump path has no file name");
            return false;
        };
        let destination = self.dir.join(format!("{tag}-{}", file_name.to_string_lossy()));
        match std::fs::rename(source, &destination) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, tag, path, "drop sink: failed to accept dump");
                false
            },
        }
    }
}
