use thiserror::Error;

/// Faults a caller must distinguish from the generic `anyhow::Error` used
/// for plumbing failures elsewhere in this crate (spec §4.3, §7).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not be reached (disk full, file removed out
    /// from under the daemon, etc).
    #[error("backing store unreachable: {0}")]
    Unavailable(#[source] anyhow::Error),
}
