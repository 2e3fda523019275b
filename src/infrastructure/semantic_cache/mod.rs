//! Semantic cache storage implementations

mod entry_store;
mod persistence;
mod stats_recorder;

pub use entry_store::EntryStore;
pub use persistence::{
    CompactionReport, EntrySnapshot, LoadReport, PersistenceConfig, SnapshotFiles, SnapshotStore,
    ENTRY_SNAPSHOT_VERSION,
};
pub use stats_recorder::{estimate_tokens, StatsRecorder};
