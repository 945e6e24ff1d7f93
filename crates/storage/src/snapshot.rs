//! Asynchronous snapshot store
//!
//! This module provides transactional, file-backed persistence with a
//! versioned, checksummed envelope and a subscribable snapshot stream.
//! Writes are serialized; a failed write leaves the observable snapshot
//! unchanged.

use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, RwLock};

/// Snapshot store error types
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store not initialized
    #[error("Store not initialized")]
    NotInitialized,

    /// Corruption detected
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Version mismatch
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Found version
        found: u32,
    },
}

/// Result type for snapshot store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Versioned state container
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
struct VersionedState<T> {
    /// Version number
    version: u32,
    /// Checksum for corruption detection
    checksum: String,
    /// The actual state data
    data: T,
}

impl<T: Serialize> VersionedState<T> {
    fn new(version: u32, data: T) -> Result<Self> {
        let data_json = serde_json::to_string(&data)?;
        let checksum = format!("{:x}", md5::compute(&data_json));

        Ok(Self { version, checksum, data })
    }

    fn verify_checksum(&self) -> Result<()> {
        let data_json = serde_json::to_string(&self.data)?;
        let computed = format!("{:x}", md5::compute(&data_json));

        if computed != self.checksum {
            return Err(StoreError::Corruption(format!(
                "Checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }

        Ok(())
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the backing file
    pub path: PathBuf,
    /// Current schema version
    pub version: u32,
    /// Enable atomic writes with temp files
    pub atomic_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("preferences.json"),
            version: 1,
            atomic_writes: true,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable or disable atomic writes
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }
}

/// Transactional snapshot store
///
/// Holds one snapshot of `T` in memory, persists every committed
/// transaction to disk, and republishes the snapshot on a watch channel
/// that replays the latest value to new subscribers.
pub struct SnapshotStore<T> {
    config: StoreConfig,
    state: RwLock<Option<T>>,
    snapshot_tx: watch::Sender<T>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    /// Create a new snapshot store
    ///
    /// The snapshot stream holds `T::default()` until [`init`](Self::init)
    /// has loaded the persisted state.
    pub fn new(config: StoreConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(T::default());
        Self {
            config,
            state: RwLock::new(None),
            snapshot_tx,
        }
    }

    /// Initialize by loading from disk, falling back to `T::default()`
    /// when no backing file exists yet
    pub async fn init(&self) -> Result<()> {
        let data = match self.load_from_disk().await {
            Ok(data) => data,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(e),
        };

        let mut state = self.state.write().await;
        *state = Some(data.clone());
        let _ = self.snapshot_tx.send(data);
        Ok(())
    }

    /// Get the current snapshot
    pub async fn get(&self) -> Result<T> {
        let state = self.state.read().await;
        state.clone().ok_or(StoreError::NotInitialized)
    }

    /// Run one transaction: clone, mutate, persist, commit
    ///
    /// Transactions are serialized on the state lock. The in-memory
    /// snapshot and the stream are updated only after the write has reached
    /// disk; a failed persist leaves both untouched.
    pub async fn edit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;
        let current = state.as_ref().ok_or(StoreError::NotInitialized)?;

        let mut next = current.clone();
        f(&mut next);

        self.write_to_disk(&next).await?;
        *state = Some(next.clone());
        let _ = self.snapshot_tx.send(next);
        Ok(())
    }

    /// Remove the backing file and reset to `T::default()` as one
    /// transaction
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;

        match fs::remove_file(&self.config.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let data = T::default();
        *state = Some(data.clone());
        let _ = self.snapshot_tx.send(data);
        Ok(())
    }

    /// Subscribe to the snapshot stream
    ///
    /// The receiver starts at the latest committed snapshot and is notified
    /// on every subsequent transaction.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.snapshot_tx.subscribe()
    }

    /// Load state from disk
    async fn load_from_disk(&self) -> Result<T> {
        let contents = fs::read_to_string(&self.config.path).await?;

        let versioned: VersionedState<T> = serde_json::from_str(&contents)?;

        versioned.verify_checksum()?;

        if versioned.version != self.config.version {
            return Err(StoreError::VersionMismatch {
                expected: self.config.version,
                found: versioned.version,
            });
        }

        Ok(versioned.data)
    }

    /// Write state to disk
    async fn write_to_disk(&self, data: &T) -> Result<()> {
        let versioned = VersionedState::new(self.config.version, data.clone())?;
        let json = serde_json::to_string_pretty(&versioned)?;

        if self.config.atomic_writes {
            self.write_atomic(&json).await?;
        } else {
            fs::write(&self.config.path, json).await?;
        }

        Ok(())
    }

    /// Write atomically using temp file + rename
    async fn write_atomic(&self, contents: &str) -> Result<()> {
        let temp_path = self.config.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.config.path).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
    struct TestState {
        counter: i32,
        name: String,
    }

    fn store_at(dir: &TempDir, file: &str) -> SnapshotStore<TestState> {
        SnapshotStore::new(StoreConfig::new(dir.path().join(file)))
    }

    #[tokio::test]
    async fn test_init_defaults_without_backing_file() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, "state.json");

        store.init().await.unwrap();

        let current = store.get().await.unwrap();
        assert_eq!(current, TestState::default());
    }

    #[tokio::test]
    async fn test_get_before_init_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, "state.json");

        let result = store.get().await;
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_edit_commits_and_persists() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path().join("state.json"));

        {
            let store: SnapshotStore<TestState> = SnapshotStore::new(config.clone());
            store.init().await.unwrap();

            store
                .edit(|s| {
                    s.counter = 99;
                    s.name = "persisted".to_string();
                })
                .await
                .unwrap();
        }

        // Reopen and verify the transaction survived
        {
            let store: SnapshotStore<TestState> = SnapshotStore::new(config);
            store.init().await.unwrap();

            let current = store.get().await.unwrap();
            assert_eq!(current.counter, 99);
            assert_eq!(current.name, "persisted");
        }
    }

    #[tokio::test]
    async fn test_snapshot_stream_replays_and_notifies() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, "state.json");
        store.init().await.unwrap();

        store.edit(|s| s.counter = 1).await.unwrap();

        // Late subscriber sees the latest committed snapshot immediately
        let mut rx = store.subscribe();
        assert_eq!(rx.borrow_and_update().counter, 1);

        store.edit(|s| s.counter = 2).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().counter, 2);
    }

    #[tokio::test]
    async fn test_failed_edit_leaves_snapshot_unchanged() {
        let dir = TempDir::new().unwrap();
        // Parent directory never exists, so every persist fails
        let store: SnapshotStore<TestState> =
            SnapshotStore::new(StoreConfig::new(dir.path().join("missing").join("state.json")));
        store.init().await.unwrap();

        let mut rx = store.subscribe();
        rx.borrow_and_update();

        let result = store.edit(|s| s.counter = 7).await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        assert_eq!(store.get().await.unwrap(), TestState::default());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_clear_resets_and_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store: SnapshotStore<TestState> = SnapshotStore::new(StoreConfig::new(&path));
        store.init().await.unwrap();

        store.edit(|s| s.counter = 42).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(!path.exists());
        assert_eq!(store.get().await.unwrap(), TestState::default());
    }

    #[tokio::test]
    async fn test_corruption_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let config = StoreConfig::new(&path);

        let store: SnapshotStore<TestState> = SnapshotStore::new(config.clone());
        store.init().await.unwrap();
        store.edit(|s| s.counter = 42).await.unwrap();

        // Tamper with the payload without updating the checksum
        let contents = fs::read_to_string(&path).await.unwrap();
        fs::write(&path, contents.replace("42", "99")).await.unwrap();

        let reopened: SnapshotStore<TestState> = SnapshotStore::new(config);
        let result = reopened.init().await;
        assert!(matches!(result, Err(StoreError::Corruption(_))));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store: SnapshotStore<TestState> =
            SnapshotStore::new(StoreConfig::new(&path).version(1));
        store.init().await.unwrap();
        store.edit(|s| s.counter = 1).await.unwrap();

        let reopened: SnapshotStore<TestState> =
            SnapshotStore::new(StoreConfig::new(&path).version(2));
        let result = reopened.init().await;
        assert!(matches!(
            result,
            Err(StoreError::VersionMismatch { expected: 2, found: 1 })
        ));
    }

    #[tokio::test]
    async fn test_atomic_writes_clean_up_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store: SnapshotStore<TestState> =
            SnapshotStore::new(StoreConfig::new(&path).atomic_writes(true));
        store.init().await.unwrap();

        store.edit(|s| s.counter = 123).await.unwrap();

        assert!(!path.with_extension("tmp").exists());
    }
}
