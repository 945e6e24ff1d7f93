//! Key-value store for the legacy preference backend
//!
//! This module provides a fast, type-safe key-value store using sled,
//! with synchronous reads and writes and a single replaceable change
//! listener in the manner of classic preference stores.

use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Key-value store error types
#[derive(Debug, Error)]
pub enum KvError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for key-value operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database path
    pub path: String,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Enable compression
    pub use_compression: bool,
    /// Flush interval in milliseconds (None for immediate flush)
    pub flush_every_ms: Option<u64>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: "twinprefs_kv.db".to_string(),
            cache_capacity: 8 * 1024 * 1024,
            use_compression: true,
            flush_every_ms: Some(500),
        }
    }
}

impl KvConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }
}

/// Callback invoked with the store handle and the key that changed.
pub type ChangeListener = Box<dyn Fn(&KvStore, &str) + Send + Sync>;

/// Key-value store implementation
///
/// At most one change listener is active at a time; registering a new one
/// replaces the old one. The listener is invoked synchronously on the
/// writing thread after each successful write, and once per
/// previously-existing key after a bulk [`clear`](KvStore::clear).
pub struct KvStore {
    db: Arc<Db>,
    listener: Mutex<Option<ChangeListener>>,
}

impl KvStore {
    /// Create a new key-value store with configuration
    pub fn new(config: KvConfig) -> Result<Self> {
        let mut db_config = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .use_compression(config.use_compression);

        if let Some(ms) = config.flush_every_ms {
            db_config = db_config.flush_every_ms(Some(ms));
        }

        let db = db_config.open()?;

        Ok(Self { db: Arc::new(db), listener: Mutex::new(None) })
    }

    /// Create an in-memory key-value store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;

        Ok(Self { db: Arc::new(db), listener: Mutex::new(None) })
    }

    /// Get a value by key
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => {
                let value: T = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a value by key
    ///
    /// The write is applied immediately with sled's fire-and-forget
    /// durability; the registered listener is notified afterwards.
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        self.notify(key);
        Ok(())
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// Get all keys currently in the store
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for item in self.db.iter() {
            let (key, _) = item?;
            if let Ok(key_str) = String::from_utf8(key.to_vec()) {
                keys.push(key_str);
            }
        }

        Ok(keys)
    }

    /// Remove all keys
    ///
    /// The underlying bulk clear does not notify per key, so the registered
    /// listener is invoked once for each previously-existing key afterwards.
    pub fn clear(&self) -> Result<()> {
        let existing = self.keys()?;
        self.db.clear()?;

        for key in existing {
            self.notify(&key);
        }

        Ok(())
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Register the change listener, replacing any previous one
    ///
    /// The listener slot is held locked during dispatch; the listener must
    /// not call back into listener registration.
    pub fn register_change_listener(&self, listener: ChangeListener) {
        let mut slot = self.listener.lock().unwrap();
        *slot = Some(listener);
    }

    /// Unregister the change listener, if any
    pub fn unregister_change_listener(&self) {
        let mut slot = self.listener.lock().unwrap();
        *slot = None;
    }

    fn notify(&self, key: &str) {
        let slot = self.listener.lock().unwrap();
        if let Some(listener) = slot.as_ref() {
            listener(self, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_kv_store_creation() {
        let kv = KvStore::in_memory().unwrap();
        assert!(kv.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let kv = KvStore::in_memory().unwrap();

        kv.set("test_key", &"test_value".to_string()).unwrap();

        let value: Option<String> = kv.get("test_key").unwrap();
        assert_eq!(value, Some("test_value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let kv = KvStore::in_memory().unwrap();
        let value: Option<String> = kv.get("nonexistent").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_contains() {
        let kv = KvStore::in_memory().unwrap();

        assert!(!kv.contains("key").unwrap());
        kv.set("key", &"value".to_string()).unwrap();
        assert!(kv.contains("key").unwrap());
    }

    #[test]
    fn test_clear() {
        let kv = KvStore::in_memory().unwrap();

        kv.set("key1", &"value1".to_string()).unwrap();
        kv.set("key2", &"value2".to_string()).unwrap();
        assert_eq!(kv.len(), 2);

        kv.clear().unwrap();
        assert!(kv.is_empty());
    }

    #[test]
    fn test_listener_notified_on_set() {
        let kv = Arc::new(KvStore::in_memory().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let listener_seen = Arc::clone(&seen);
        kv.register_change_listener(Box::new(move |_, key| {
            listener_seen.lock().unwrap().push(key.to_string());
        }));

        kv.set("alpha", &1).unwrap();
        kv.set("beta", &2).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_listener_reads_written_value() {
        let kv = Arc::new(KvStore::in_memory().unwrap());
        let observed = Arc::new(Mutex::new(None));

        let listener_observed = Arc::clone(&observed);
        kv.register_change_listener(Box::new(move |store, key| {
            let value: Option<i64> = store.get(key).unwrap();
            *listener_observed.lock().unwrap() = value;
        }));

        kv.set("counter", &42i64).unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(42));
    }

    #[test]
    fn test_clear_notifies_per_existing_key() {
        let kv = Arc::new(KvStore::in_memory().unwrap());

        kv.set("one", &1).unwrap();
        kv.set("two", &2).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener_seen = Arc::clone(&seen);
        kv.register_change_listener(Box::new(move |_, key| {
            listener_seen.lock().unwrap().push(key.to_string());
        }));

        kv.clear().unwrap();

        let mut keys = seen.lock().unwrap().clone();
        keys.sort();
        assert_eq!(keys, vec!["one", "two"]);
    }

    #[test]
    fn test_registering_replaces_previous_listener() {
        let kv = Arc::new(KvStore::in_memory().unwrap());
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first_calls);
        kv.register_change_listener(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        kv.set("key", &1).unwrap();

        let counter = Arc::clone(&second_calls);
        kv.register_change_listener(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        kv.set("key", &2).unwrap();

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_stops_notifications() {
        let kv = Arc::new(KvStore::in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        kv.register_change_listener(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        kv.set("key", &1).unwrap();
        kv.unregister_change_listener();
        kv.set("key", &2).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_builder() {
        let config = KvConfig::new("test.db")
            .cache_capacity(32 * 1024 * 1024)
            .use_compression(false)
            .flush_every_ms(Some(1000));

        assert_eq!(config.path, "test.db");
        assert_eq!(config.cache_capacity, 32 * 1024 * 1024);
        assert!(!config.use_compression);
        assert_eq!(config.flush_every_ms, Some(1000));
    }
}
