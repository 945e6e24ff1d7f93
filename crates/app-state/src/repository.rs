//! Repository adaptation over a preference source
//!
//! Pure passthrough: forwards the observable slots, the error stream, and
//! the write operations of whichever backend was selected at construction,
//! so screens stay agnostic to the store behind them.

use async_trait::async_trait;
use std::sync::Arc;
use storage::preferences::{PreferenceError, UserPreferences};
use tokio::sync::{broadcast, watch};

/// Repository interface consumed by the presentation layer
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
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

    /// Remove all keys, resetting every value to its declared default
    async fn clear(&self);
}

/// Repository over the preference source selected at construction time
///
/// Adds nothing beyond forwarding and tracing; errors are neither
/// swallowed nor duplicated.
pub struct UserPreferencesRepository {
    preferences: Arc<dyn UserPreferences>,
}

impl UserPreferencesRepository {
    /// Wrap a preference source
    pub fn new(preferences: Arc<dyn UserPreferences>) -> Self {
        Self { preferences }
    }
}

#[async_trait]
impl PreferenceRepository for UserPreferencesRepository {
    fn string_preference(&self) -> watch::Receiver<String> {
        self.preferences.string_preference()
    }

    fn boolean_preference(&self) -> watch::Receiver<bool> {
        self.preferences.boolean_preference()
    }

    fn int_preference(&self) -> watch::Receiver<i64> {
        self.preferences.int_preference()
    }

    fn preference_errors(&self) -> broadcast::Receiver<PreferenceError> {
        self.preferences.preference_errors()
    }

    async fn update_string_preference(&self, new_value: String) {
        tracing::debug!("updating string preference");
        self.preferences.update_string_preference(new_value).await;
    }

    async fn update_boolean_preference(&self, new_value: bool) {
        tracing::debug!("updating boolean preference");
        self.preferences.update_boolean_preference(new_value).await;
    }

    async fn update_int_preference(&self, new_value: i64) {
        tracing::debug!("updating int preference");
        self.preferences.update_int_preference(new_value).await;
    }

    async fn clear(&self) {
        tracing::debug!("clearing preferences");
        self.preferences.clear().await;
    }
}
