/// The seam between the config store and whatever persists the one-row
/// config document. Mirrors the teacher's `common::persistence::Persistence`
/// / `sqlite::SqlitePersistence` split: `sld-config` depends only on this
/// trait, `sld-storage::Storage` is its sole implementation, so the two
/// crates don't need a dependency edge in either direction.
pub trait ConfigPersistence: Send + Sync {
    fn get_config(&self) -> anyhow::Result<String>;
    fn set_config(&self, json: &str) -> anyhow::Result<()>;
}
