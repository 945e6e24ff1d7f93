//! Legacy-backend preference source
//!
//! Bridges the synchronous key-value store into the observable capability
//! surface: slots are seeded from the store at construction, then kept
//! current by the store's single change listener.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::kv::KvStore;
use crate::preferences::{PrefKeys, PrefSlot, PreferenceError, UserPreferences};

const ERROR_CHANNEL_CAPACITY: usize = 16;

struct Slots {
    string: PrefSlot<String>,
    boolean: PrefSlot<bool>,
    int: PrefSlot<i64>,
}

impl Slots {
    fn refresh_all(&self, kv: &KvStore) {
        refresh_slot(&self.string, kv);
        refresh_slot(&self.boolean, kv);
        refresh_slot(&self.int, kv);
    }

    fn refresh(&self, kv: &KvStore, key: &str) {
        if key == self.string.key().name() {
            refresh_slot(&self.string, kv);
        } else if key == self.boolean.key().name() {
            refresh_slot(&self.boolean, kv);
        } else if key == self.int.key().name() {
            refresh_slot(&self.int, kv);
        }
    }
}

/// Read the current value for one slot, falling back to the declared
/// default when the key is absent or unreadable.
fn refresh_slot<T>(slot: &PrefSlot<T>, kv: &KvStore)
where
    T: Clone + PartialEq + DeserializeOwned + Send + Sync + 'static,
{
    let value = match kv.get::<T>(slot.key().name()) {
        Ok(Some(value)) => value,
        Ok(None) => slot.key().default_value(),
        Err(e) => {
            tracing::warn!(key = slot.key().name(), error = %e, "failed to read preference, using default");
            slot.key().default_value()
        }
    };
    slot.set(value);
}

/// Preference source over the synchronous key-value store
///
/// One source per store namespace is the intended usage: construction
/// registers the store's single change listener, so a second source over
/// the same store would evict the first one's listener.
pub struct KvPreferences {
    kv: Arc<KvStore>,
    slots: Arc<Slots>,
    errors_tx: broadcast::Sender<PreferenceError>,
}

impl KvPreferences {
    /// Build the source and register its change listener
    ///
    /// Each slot is seeded with the stored value (or its declared default)
    /// before the listener can deliver changes.
    pub fn new(kv: Arc<KvStore>, keys: PrefKeys) -> Self {
        let slots = Arc::new(Slots {
            string: PrefSlot::new(keys.string),
            boolean: PrefSlot::new(keys.boolean),
            int: PrefSlot::new(keys.int),
        });

        slots.refresh_all(&kv);

        let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        let listener_slots = Arc::clone(&slots);
        kv.register_change_listener(Box::new(move |store, key| {
            listener_slots.refresh(store, key);
        }));

        Self { kv, slots, errors_tx }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.kv.set(key, value) {
            tracing::error!(key, error = %e, "preference update failed");
            let _ = self.errors_tx.send(PreferenceError::Write(e.to_string()));
        }
    }
}

#[async_trait]
impl UserPreferences for KvPreferences {
    fn string_preference(&self) -> watch::Receiver<String> {
        self.slots.string.subscribe()
    }

    fn boolean_preference(&self) -> watch::Receiver<bool> {
        self.slots.boolean.subscribe()
    }

    fn int_preference(&self) -> watch::Receiver<i64> {
        self.slots.int.subscribe()
    }

    fn preference_errors(&self) -> broadcast::Receiver<PreferenceError> {
        self.errors_tx.subscribe()
    }

    async fn update_string_preference(&self, new_value: String) {
        self.write(self.slots.string.key().name(), &new_value);
    }

    async fn update_boolean_preference(&self, new_value: bool) {
        self.write(self.slots.boolean.key().name(), &new_value);
    }

    async fn update_int_preference(&self, new_value: i64) {
        self.write(self.slots.int.key().name(), &new_value);
    }

    async fn clear(&self) {
        if let Err(e) = self.kv.clear() {
            tracing::error!(error = %e, "preference clear failed");
            let _ = self.errors_tx.send(PreferenceError::Write(e.to_string()));
        }
    }
}

impl Drop for KvPreferences {
    fn drop(&mut self) {
        self.kv.unregister_change_listener();
    }
}
