//! Demo binary: drives the same preference screen against both backends.
//!
//! Each backend gets its own storage namespace, its own repository, and its
//! own screen model; the scripted pass below edits all three values, waits
//! for the observable snapshot to catch up, then clears.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use app_state::{PreferenceRepository, PreferenceScreenModel, PreferenceScreenState, UserPreferencesRepository};
use storage::{
    KvConfig, KvPreferences, KvStore, PrefKeys, PrefMap, SnapshotStore, StoreConfig,
    StorePreferences, UserPreferences,
};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let data_dir = std::env::temp_dir().join("twinprefs-demo");
    std::fs::create_dir_all(&data_dir).context("creating data directory")?;
    tracing::info!(path = %data_dir.display(), "using data directory");

    // Legacy backend: synchronous key-value store with a change listener
    let kv = Arc::new(KvStore::new(KvConfig::new(
        data_dir.join("legacy_prefs.db").display().to_string(),
    ))?);
    let legacy = Arc::new(KvPreferences::new(Arc::clone(&kv), PrefKeys::default()));
    run_screen("legacy", legacy).await?;

    // Asynchronous backend: transactional snapshot store
    let store: Arc<SnapshotStore<PrefMap>> = Arc::new(SnapshotStore::new(StoreConfig::new(
        data_dir.join("typed_prefs.json"),
    )));
    store.init().await?;
    let typed = Arc::new(StorePreferences::new(
        store,
        PrefKeys::default(),
        &tokio::runtime::Handle::current(),
    ));
    run_screen("typed", typed).await?;

    Ok(())
}

async fn run_screen(backend: &str, preferences: Arc<dyn UserPreferences>) -> Result<()> {
    let repository: Arc<dyn PreferenceRepository> =
        Arc::new(UserPreferencesRepository::new(preferences));
    let screen = PreferenceScreenModel::new(repository);
    let mut state_rx = screen.subscribe();

    wait_until(&mut state_rx, |s| !s.is_loading).await?;
    tracing::info!(backend, state = ?state_rx.borrow().clone(), "initial state");

    screen.update_string_preference("hello".to_string());
    screen.update_boolean_preference(true);
    screen.update_int_preference(42);
    wait_until(&mut state_rx, |s| {
        s.string_preference.as_deref() == Some("hello")
            && s.boolean_preference == Some(true)
            && s.int_preference == Some(42)
    })
    .await?;
    tracing::info!(backend, state = ?state_rx.borrow().clone(), "after edits");

    screen.clear();
    wait_until(&mut state_rx, |s| {
        s.string_preference.as_deref() == Some("")
            && s.boolean_preference == Some(false)
            && s.int_preference == Some(0)
    })
    .await?;
    tracing::info!(backend, state = ?state_rx.borrow().clone(), "after clear");

    Ok(())
}

async fn wait_until(
    rx: &mut watch::Receiver<PreferenceScreenState>,
    pred: impl Fn(&PreferenceScreenState) -> bool,
) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                break Ok(());
            }
            rx.changed().await.context("screen state stream closed")?;
        }
    })
    .await
    .context("screen state did not converge in time")?
}
