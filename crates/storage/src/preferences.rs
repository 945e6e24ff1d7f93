//! Preference vocabulary shared by both backends
//!
//! Defines the typed preference keys and their declared defaults, the
//! observable capability trait both backends implement, and the error
//! event type carried on the error stream.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

/// Storage key for the string preference
pub const PREF_KEY_STRING: &str = "keyString";
/// Storage key for the boolean preference
pub const PREF_KEY_BOOLEAN: &str = "keyBoolean";
/// Storage key for the integer preference
pub const PREF_KEY_INT: &str = "keyInt";

/// Snapshot payload of the asynchronous backend: key to JSON value
///
/// A `BTreeMap` keeps serialization order stable so the persisted
/// checksum stays reproducible.
pub type PrefMap = BTreeMap<String, serde_json::Value>;

/// Discrete failure event carried on a preference error stream
///
/// Events are multicast and not replayed; subscribers only see failures
/// emitted after they subscribe.
#[derive(Debug, Clone, Error)]
pub enum PreferenceError {
    /// An update or clear against the backing store did not complete
    #[error("preference write failed: {0}")]
    Write(String),

    /// The background change subscription raised, or produced a stored
    /// value that could not be decoded
    #[error("preference subscription failed: {0}")]
    Subscription(String),
}

/// A typed preference key with its declared default
#[derive(Debug, Clone)]
pub struct PrefKey<T> {
    name: &'static str,
    default: T,
}

impl<T: Clone> PrefKey<T> {
    /// Create a key with its declared default
    pub fn new(name: &'static str, default: T) -> Self {
        Self { name, default }
    }

    /// The storage key name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared default, used whenever the key is absent
    pub fn default_value(&self) -> T {
        self.default.clone()
    }
}

/// The three typed keys a preference screen operates on
#[derive(Debug, Clone)]
pub struct PrefKeys {
    /// String-valued key
    pub string: PrefKey<String>,
    /// Boolean-valued key
    pub boolean: PrefKey<bool>,
    /// Integer-valued key
    pub int: PrefKey<i64>,
}

impl Default for PrefKeys {
    fn default() -> Self {
        Self {
            string: PrefKey::new(PREF_KEY_STRING, String::new()),
            boolean: PrefKey::new(PREF_KEY_BOOLEAN, false),
            int: PrefKey::new(PREF_KEY_INT, 0),
        }
    }
}

/// Observable slot holding the latest value for one typed key.
///
/// Latest-value-wins; the current value is replayed to new subscribers.
/// Equal values are conflated and do not notify.
pub(crate) struct PrefSlot<T> {
    key: PrefKey<T>,
    tx: watch::Sender<T>,
}

impl<T> PrefSlot<T>
where
    T: Clone + PartialEq + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(key: PrefKey<T>) -> Self {
        let (tx, _) = watch::channel(key.default_value());
        Self { key, tx }
    }

    pub(crate) fn key(&self) -> &PrefKey<T> {
        &self.key
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Re-derive this slot from a full snapshot.
    ///
    /// Absent key: declared default. Undecodable value: the slot keeps its
    /// prior value and the failure goes to the error stream instead.
    pub(crate) fn apply_snapshot(
        &self,
        snapshot: &PrefMap,
        errors: &broadcast::Sender<PreferenceError>,
    ) {
        match snapshot.get(self.key.name) {
            None => self.set(self.key.default_value()),
            Some(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(decoded) => self.set(decoded),
                Err(e) => {
                    tracing::warn!(key = self.key.name, error = %e, "undecodable stored preference value");
                    let _ = errors.send(PreferenceError::Subscription(format!(
                        "stored value for {} could not be decoded: {e}",
                        self.key.name
                    )));
                }
            },
        }
    }
}

/// Capability interface over a preference backend
///
/// The two backends are interchangeable behind this trait, selected at
/// construction time. Update operations never fail from the caller's
/// perspective: failures are caught at the wrapper boundary and surface
/// only on the error stream.
#[async_trait]
pub trait UserPreferences: Send + Sync {
    /// Latest string value; the current value is replayed on subscribe
    fn string_preference(&self) -> watch::Receiver<String>;

    /// Latest boolean value; the current value is replayed on subscribe
    fn boolean_preference(&self) -> watch::Receiver<bool>;

    /// Latest integer value; the current value is replayed on subscribe
    fn int_preference(&self) -> watch::Receiver<i64>;

    /// Multicast failure events; no replay for late subscribers
    fn preference_errors(&self) -> broadcast::Receiver<PreferenceError>;

    /// Write the string preference
    async fn update_string_preference(&self, new_value: String);

    /// Write the boolean preference
    async fn update_boolean_preference(&self, new_value: bool);

    /// Write the integer preference
    async fn update_int_preference(&self, new_value: i64);

    /// Remove all keys; every slot returns to its declared default
    async fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let keys = PrefKeys::default();
        assert_eq!(keys.string.name(), "keyString");
        assert_eq!(keys.boolean.name(), "keyBoolean");
        assert_eq!(keys.int.name(), "keyInt");
        assert_eq!(keys.string.default_value(), "");
        assert!(!keys.boolean.default_value());
        assert_eq!(keys.int.default_value(), 0);
    }

    #[test]
    fn test_slot_conflates_equal_values() {
        let slot = PrefSlot::new(PrefKey::new("count", 0i64));
        let mut rx = slot.subscribe();
        rx.borrow_and_update();

        slot.set(0);
        assert!(!rx.has_changed().unwrap());

        slot.set(5);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 5);
    }

    #[test]
    fn test_apply_snapshot_absent_key_resets_to_default() {
        let slot = PrefSlot::new(PrefKey::new("name", "fallback".to_string()));
        let (errors, _) = broadcast::channel(4);

        slot.set("stored".to_string());
        slot.apply_snapshot(&PrefMap::new(), &errors);

        assert_eq!(*slot.subscribe().borrow(), "fallback");
    }

    #[test]
    fn test_apply_snapshot_undecodable_value_keeps_prior() {
        let slot = PrefSlot::new(PrefKey::new("count", 0i64));
        let (errors, mut errors_rx) = broadcast::channel(4);

        slot.set(5);

        let mut snapshot = PrefMap::new();
        snapshot.insert("count".to_string(), serde_json::json!("not a number"));
        slot.apply_snapshot(&snapshot, &errors);

        assert_eq!(*slot.subscribe().borrow(), 5);
        assert!(matches!(
            errors_rx.try_recv().unwrap(),
            PreferenceError::Subscription(_)
        ));
    }
}
