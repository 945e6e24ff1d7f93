//! Storage layer for twinprefs
//!
//! This crate provides the two preference persistence backends — a
//! synchronous key-value store with change notification, and an
//! asynchronous transactional snapshot store — unified behind one
//! observable capability trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod kv;
pub mod kv_prefs;
pub mod preferences;
pub mod snapshot;
pub mod store_prefs;

pub use kv::{KvConfig, KvError, KvStore};
pub use kv_prefs::KvPreferences;
pub use preferences::{
    PrefKey, PrefKeys, PrefMap, PreferenceError, UserPreferences, PREF_KEY_BOOLEAN, PREF_KEY_INT,
    PREF_KEY_STRING,
};
pub use snapshot::{SnapshotStore, StoreConfig, StoreError};
pub use store_prefs::StorePreferences;
