//! Asynchronous-backend preference source
//!
//! Republishes the snapshot store's change stream into the three typed
//! slots from one long-lived background subscription, and serializes
//! writes through single-key edit transactions.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::preferences::{PrefKeys, PrefMap, PrefSlot, PreferenceError, UserPreferences};
use crate::snapshot::SnapshotStore;

const ERROR_CHANNEL_CAPACITY: usize = 16;

struct Slots {
    string: PrefSlot<String>,
    boolean: PrefSlot<bool>,
    int: PrefSlot<i64>,
}

impl Slots {
    fn apply(&self, snapshot: &PrefMap, errors: &broadcast::Sender<PreferenceError>) {
        self.string.apply_snapshot(snapshot, errors);
        self.boolean.apply_snapshot(snapshot, errors);
        self.int.apply_snapshot(snapshot, errors);
    }
}

/// Preference source over the asynchronous snapshot store
///
/// Exactly one background subscription is started per instance. A decode
/// failure is reported on the error stream and the subscription keeps
/// collecting; it ends only when the store itself is dropped. Dropping the
/// source aborts the subscription.
pub struct StorePreferences {
    store: Arc<SnapshotStore<PrefMap>>,
    slots: Arc<Slots>,
    errors_tx: broadcast::Sender<PreferenceError>,
    subscription: JoinHandle<()>,
}

impl StorePreferences {
    /// Build the source and start its background subscription
    ///
    /// The subscription runs on the supplied runtime so it can outlive any
    /// individual screen; update operations run on the caller's task. The
    /// store is expected to be initialized — until then the slots hold
    /// their declared defaults.
    pub fn new(
        store: Arc<SnapshotStore<PrefMap>>,
        keys: PrefKeys,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let slots = Arc::new(Slots {
            string: PrefSlot::new(keys.string),
            boolean: PrefSlot::new(keys.boolean),
            int: PrefSlot::new(keys.int),
        });

        let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        let mut snapshots = store.subscribe();
        let task_slots = Arc::clone(&slots);
        let task_errors = errors_tx.clone();
        let subscription = runtime.spawn(async move {
            loop {
                let snapshot = snapshots.borrow_and_update().clone();
                task_slots.apply(&snapshot, &task_errors);
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { store, slots, errors_tx, subscription }
    }

    async fn edit_value(&self, key: &'static str, value: serde_json::Value) {
        let result = self
            .store
            .edit(|prefs| {
                prefs.insert(key.to_string(), value);
            })
            .await;

        if let Err(e) = result {
            tracing::error!(key, error = %e, "preference update failed");
            let _ = self.errors_tx.send(PreferenceError::Write(e.to_string()));
        }
    }
}

#[async_trait]
impl UserPreferences for StorePreferences {
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
        let key = self.slots.string.key().name();
        self.edit_value(key, serde_json::json!(new_value)).await;
    }

    async fn update_boolean_preference(&self, new_value: bool) {
        let key = self.slots.boolean.key().name();
        self.edit_value(key, serde_json::json!(new_value)).await;
    }

    async fn update_int_preference(&self, new_value: i64) {
        let key = self.slots.int.key().name();
        self.edit_value(key, serde_json::json!(new_value)).await;
    }

    async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::error!(error = %e, "preference clear failed");
            let _ = self.errors_tx.send(PreferenceError::Write(e.to_string()));
        }
    }
}

impl Drop for StorePreferences {
    fn drop(&mut self) {
        self.subscription.abort();
    }
}
