//! Per-screen presentation state
//!
//! Folds the repository's three value streams and its error stream into a
//! single observable snapshot for the rendering layer, and forwards user
//! edits back without awaiting them.

use std::sync::Arc;
use storage::preferences::PreferenceError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::repository::PreferenceRepository;

/// One pending, user-visible failure notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Identifier used to acknowledge this message
    pub id: Uuid,
    /// Human-readable failure text
    pub message: String,
}

/// Snapshot of everything a preference screen renders
///
/// `is_loading` is true exactly while at least one field has not received
/// a value, except that an error resolves the loading state immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceScreenState {
    /// Whether any of the three values is still unobserved
    pub is_loading: bool,
    /// Last observed string value, if any
    pub string_preference: Option<String>,
    /// Last observed boolean value, if any
    pub boolean_preference: Option<bool>,
    /// Last observed integer value, if any
    pub int_preference: Option<i64>,
    /// Pending error notifications, in arrival order
    pub error_messages: Vec<ErrorMessage>,
}

impl Default for PreferenceScreenState {
    fn default() -> Self {
        Self {
            is_loading: true,
            string_preference: None,
            boolean_preference: None,
            int_preference: None,
            error_messages: Vec::new(),
        }
    }
}

impl PreferenceScreenState {
    fn recompute_loading(&mut self) {
        self.is_loading = self.string_preference.is_none()
            || self.boolean_preference.is_none()
            || self.int_preference.is_none();
    }
}

/// State holder for one preference screen
///
/// Subscribes independently to each repository stream; all subscriptions
/// share the holder's lifetime and are cancelled as a unit when it is
/// dropped. Every snapshot mutation goes through the watch sender's atomic
/// update, so concurrent emissions can reorder but never corrupt the
/// snapshot.
pub struct PreferenceScreenModel {
    repository: Arc<dyn PreferenceRepository>,
    ui_tx: watch::Sender<PreferenceScreenState>,
    tasks: Vec<JoinHandle<()>>,
}

impl PreferenceScreenModel {
    /// Build the model and start its four subscriptions
    pub fn new(repository: Arc<dyn PreferenceRepository>) -> Self {
        let (ui_tx, _) = watch::channel(PreferenceScreenState::default());

        // Subscribe before spawning so no emission can slip past setup
        let string_rx = repository.string_preference();
        let boolean_rx = repository.boolean_preference();
        let int_rx = repository.int_preference();
        let errors_rx = repository.preference_errors();

        let tasks = vec![
            spawn_value_task(ui_tx.clone(), string_rx, |state, value| {
                state.string_preference = Some(value);
            }),
            spawn_value_task(ui_tx.clone(), boolean_rx, |state, value| {
                state.boolean_preference = Some(value);
            }),
            spawn_value_task(ui_tx.clone(), int_rx, |state, value| {
                state.int_preference = Some(value);
            }),
            spawn_error_task(ui_tx.clone(), errors_rx),
        ];

        Self { repository, ui_tx, tasks }
    }

    /// Subscribe to the screen state snapshot
    pub fn subscribe(&self) -> watch::Receiver<PreferenceScreenState> {
        self.ui_tx.subscribe()
    }

    /// Current screen state snapshot
    pub fn state(&self) -> PreferenceScreenState {
        self.ui_tx.borrow().clone()
    }

    /// Write the string preference without awaiting completion
    ///
    /// Completion and failure are observed only through the value and
    /// error streams.
    pub fn update_string_preference(&self, new_value: String) {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            repository.update_string_preference(new_value).await;
        });
    }

    /// Write the boolean preference without awaiting completion
    pub fn update_boolean_preference(&self, new_value: bool) {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            repository.update_boolean_preference(new_value).await;
        });
    }

    /// Write the integer preference without awaiting completion
    pub fn update_int_preference(&self, new_value: i64) {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            repository.update_int_preference(new_value).await;
        });
    }

    /// Reset all preferences to their defaults without awaiting completion
    pub fn clear(&self) {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            repository.clear().await;
        });
    }

    /// Acknowledge one pending error; no-op when the id is unknown
    pub fn error_shown(&self, error_id: Uuid) {
        self.ui_tx.send_modify(|state| {
            state.error_messages.retain(|m| m.id != error_id);
        });
    }
}

impl Drop for PreferenceScreenModel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_value_task<T, F>(
    ui_tx: watch::Sender<PreferenceScreenState>,
    mut rx: watch::Receiver<T>,
    assign: F,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&mut PreferenceScreenState, T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let value = rx.borrow_and_update().clone();
            ui_tx.send_modify(|state| {
                assign(state, value);
                state.recompute_loading();
            });
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn spawn_error_task(
    ui_tx: watch::Sender<PreferenceScreenState>,
    mut rx: broadcast::Receiver<PreferenceError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(error) => {
                    tracing::error!(error = %error, "preference backend reported a failure");
                    let mut message = error.to_string();
                    if message.is_empty() {
                        message = "unknown error".to_string();
                    }
                    ui_tx.send_modify(|state| {
                        state.error_messages.push(ErrorMessage { id: Uuid::new_v4(), message });
                        // An error resolves the loading state even before
                        // all fields have arrived
                        state.is_loading = false;
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "preference error stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
