//! Snapshot files for the index and the entry store

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::domain::semantic_cache::CacheEntry;
use crate::domain::DomainError;

/// Current entry snapshot format
pub const ENTRY_SNAPSHOT_VERSION: u32 = 1;

/// Where the two snapshot artifacts live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_entries_path")]
    pub entries_path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/semantic_cache.index")
}

fn default_entries_path() -> PathBuf {
    PathBuf::from("data/semantic_cache.entries.json")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            entries_path: default_entries_path(),
        }
    }
}

impl PersistenceConfig {
    /// Both artifacts inside `dir`, with the default file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            index_path: dir.join("semantic_cache.index"),
            entries_path: dir.join("semantic_cache.entries.json"),
        }
    }
}

/// Serialized form of the entry store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Index dimension when the snapshot was taken
    pub dimension: Option<usize>,
    /// SHA-256 of the index artifact written alongside
    #[serde(default)]
    pub index_sha256: Option<String>,
    pub entries: Vec<CacheEntry>,
}

impl EntrySnapshot {
    pub fn new(dimension: Option<usize>, entries: Vec<CacheEntry>) -> Self {
        Self {
            version: ENTRY_SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            dimension,
            index_sha256: None,
            entries,
        }
    }

    /// Bind the snapshot to the index bytes it was saved with
    pub fn with_index(mut self, index: &[u8]) -> Self {
        self.index_sha256 = Some(hex::encode(Sha256::digest(index)));
        self
    }

    /// Fails when the snapshot was bound to different index bytes
    pub fn check_index(&self, index: &[u8]) -> Result<(), DomainError> {
        let Some(expected) = &self.index_sha256 else {
            return Ok(());
        };

        if *expected != hex::encode(Sha256::digest(index)) {
            return Err(DomainError::persistence(
                "entry snapshot was written for a different index artifact",
            ));
        }

        Ok(())
    }
}

/// Raw artifacts read back from disk, not yet validated against each other
#[derive(Debug)]
pub struct SnapshotFiles {
    pub index: Vec<u8>,
    pub entries: EntrySnapshot,
}

/// Outcome of the most recent load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: bool,
    pub entries: usize,
    pub vectors: usize,
    /// Entries dropped as corrupt
    pub skipped: usize,
    /// Why the snapshot was rejected, when it was
    pub failure: Option<String>,
}

impl LoadReport {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Outcome of an index rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub expired_removed: usize,
    pub live_entries: usize,
    pub index_size_before: usize,
    pub index_size_after: usize,
}

impl CompactionReport {
    pub fn reclaimed_slots(&self) -> usize {
        self.index_size_before.saturating_sub(self.index_size_after)
    }
}

/// Reads and atomically replaces the snapshot pair
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    config: PersistenceConfig,
}

impl SnapshotStore {
    pub fn new(config: PersistenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Whether either artifact exists on disk
    pub async fn exists(&self) -> bool {
        path_exists(&self.config.index_path).await || path_exists(&self.config.entries_path).await
    }

    /// Write both artifacts, each through a sibling temp file
    pub async fn write(&self, index: Bytes, entries: &EntrySnapshot) -> Result<(), DomainError> {
        let json = serde_json::to_vec(entries).map_err(|e| {
            DomainError::persistence(format!("Failed to serialize entry snapshot: {}", e))
        })?;

        write_atomic(&self.config.index_path, &index).await?;
        write_atomic(&self.config.entries_path, &json).await?;

        debug!(
            index_bytes = index.len(),
            entry_bytes = json.len(),
            "Snapshot artifacts written"
        );

        Ok(())
    }

    /// Read both artifacts; `Ok(None)` when neither exists
    pub async fn read(&self) -> Result<Option<SnapshotFiles>, DomainError> {
        let index_exists = path_exists(&self.config.index_path).await;
        let entries_exist = path_exists(&self.config.entries_path).await;

        match (index_exists, entries_exist) {
            (false, false) => return Ok(None),
            (true, false) | (false, true) => {
                return Err(DomainError::persistence(
                    "snapshot pair is incomplete: one artifact is missing",
                ));
            }
            (true, true) => {}
        }

        let index = tokio::fs::read(&self.config.index_path).await.map_err(|e| {
            DomainError::persistence(format!("Failed to read index snapshot: {}", e))
        })?;

        let json = tokio::fs::read(&self.config.entries_path).await.map_err(|e| {
            DomainError::persistence(format!("Failed to read entry snapshot: {}", e))
        })?;

        let entries: EntrySnapshot = serde_json::from_slice(&json).map_err(|e| {
            DomainError::persistence(format!("Failed to parse entry snapshot: {}", e))
        })?;

        if entries.version != ENTRY_SNAPSHOT_VERSION {
            return Err(DomainError::persistence(format!(
                "unsupported entry snapshot version: {}",
                entries.version
            )));
        }

        Ok(Some(SnapshotFiles { index, entries }))
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), DomainError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            error!(path = %parent.display(), "Failed to create snapshot directory: {}", e);
            DomainError::persistence(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let temp = temp_path(path);

    tokio::fs::write(&temp, data).await.map_err(|e| {
        error!(path = %temp.display(), "Snapshot write failed: {}", e);
        DomainError::persistence(format!("Failed to write {}: {}", temp.display(), e))
    })?;

    tokio::fs::rename(&temp, path).await.map_err(|e| {
        error!(path = %path.display(), "Snapshot rename failed: {}", e);
        DomainError::persistence(format!("Failed to replace {}: {}", path.display(), e))
    })
}
