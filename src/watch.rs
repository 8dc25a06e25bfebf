//! Cross-process change detection.
//!
//! Other processes sharing the base directory write entries directly. A
//! `notify` watcher on the base directory reports every file event; events
//! on an entry file make the owning store reload it if its contents differ
//! from what the store last wrote or loaded. A store that reloads publishes
//! on its channel with [`Origin::External`](crate::Origin::External).

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::storage::StorageLayout;

/// A store whose entry can change underneath it.
pub(crate) trait WatchTarget: Send + Sync {
    /// Storage entry name.
    fn entry(&self) -> &'static str;

    /// Reload the entry if it differs from the last known contents, and
    /// publish if it did.
    ///
    /// # Returns
    ///
    /// `true` if the in-memory state was replaced.
    fn refresh(&self) -> Result<bool, StoreError>;
}

/// Configuration for the storage watcher.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use internboard::WatchConfig;
///
/// let config = WatchConfig {
///     debounce: Duration::from_millis(10),
/// };
/// assert!(config.debounce < WatchConfig::default().debounce);
/// ```
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How long to keep collecting file events after the first one before
    /// reloading. One atomic write produces several events.
    ///
    /// Default: 50 milliseconds.
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
        }
    }
}

/// Handle for stopping a running watcher.
///
/// Dropping the handle does **not** stop the watcher -- call
/// [`shutdown`](WatchHandle::shutdown).
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct WatchHandle {
    shutdown_tx: Arc<tokio::sync::watch::Sender<bool>>,
    task: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// Signal the watcher to stop and wait for it to exit.
    ///
    /// Calling `shutdown` more than once is safe -- subsequent calls
    /// return `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the watcher task panicked.
    pub async fn shutdown(&self) -> io::Result<()> {
        // The receiver is gone if the task already exited.
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        if let Some(join_handle) = task {
            join_handle
                .await
                .map_err(|e| io::Error::other(format!("watcher task panicked: {e}")))?;
        }
        Ok(())
    }
}

/// Watch `layout`'s base directory and refresh `targets` on foreign writes.
///
/// The base directory is created if missing. The event loop runs on
/// `runtime`; the `notify` backend delivers events from its own thread.
///
/// # Errors
///
/// Returns `io::Error` if the directory cannot be created or the platform
/// watcher cannot be started.
pub(crate) fn spawn_watcher(
    runtime: &tokio::runtime::Handle,
    layout: &StorageLayout,
    targets: Vec<Arc<dyn WatchTarget>>,
    config: WatchConfig,
) -> io::Result<WatchHandle> {
    std::fs::create_dir_all(layout.base_dir())?;
    // Backends report canonical paths on some platforms.
    let watched = StorageLayout::new(std::fs::canonicalize(layout.base_dir())?);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                for path in event.paths {
                    let _ = event_tx.send(path);
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "file watcher error"),
    })
    .map_err(io::Error::other)?;
    watcher
        .watch(watched.base_dir(), RecursiveMode::NonRecursive)
        .map_err(io::Error::other)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = runtime.spawn(run_watch_loop(
        watcher,
        watched,
        targets,
        config,
        event_rx,
        shutdown_rx,
    ));
    Ok(WatchHandle {
        shutdown_tx: Arc::new(shutdown_tx),
        task: Arc::new(tokio::sync::Mutex::new(Some(task))),
    })
}

async fn run_watch_loop(
    // Kept alive for as long as the loop runs.
    _watcher: RecommendedWatcher,
    watched: StorageLayout,
    targets: Vec<Arc<dyn WatchTarget>>,
    config: WatchConfig,
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    tracing::info!(
        base_dir = %watched.base_dir().display(),
        entries = targets.len(),
        "watcher started"
    );

    loop {
        tokio::select! {
            Some(first) = events.recv() => {
                tokio::time::sleep(config.debounce).await;
                let mut changed = BTreeSet::new();
                let mut paths = vec![first];
                while let Ok(path) = events.try_recv() {
                    paths.push(path);
                }
                for path in &paths {
                    if let Some(entry) = watched.entry_name(path) {
                        changed.insert(entry.to_owned());
                    }
                }
                refresh_entries(&targets, &changed);
            }
            // Either a shutdown signal or the handle being dropped entirely.
            _ = shutdown_rx.changed() => {
                tracing::info!("watcher stopped");
                return;
            }
        }
    }
}

/// Refresh every target whose entry is in `changed`.
///
/// A target that fails to reload (unreadable or malformed entry) keeps its
/// last good state; the failure is logged and retried on the next event.
///
/// # Returns
///
/// The number of targets that reloaded.
pub(crate) fn refresh_entries(targets: &[Arc<dyn WatchTarget>], changed: &BTreeSet<String>) -> usize {
    let mut reloaded = 0;
    for target in targets.iter().filter(|t| changed.contains(t.entry())) {
        match target.refresh() {
            Ok(true) => {
                tracing::debug!(entry = target.entry(), "foreign write picked up");
                reloaded += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    entry = target.entry(),
                    error = %e,
                    "failed to reload entry, keeping last good state"
                );
            }
        }
    }
    reloaded
}
