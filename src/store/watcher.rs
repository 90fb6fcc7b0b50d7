//! Hot-reload watcher for the store directory.
//!
//! Watches the YAML documents for changes and swaps in a freshly loaded
//! directory when they settle. An edit that fails to parse is logged and
//! skipped; the running policy stays on the last good snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::Result;

use super::FileStore;

/// File watcher that reloads the store on changes.
pub struct StoreWatcher {
    /// The underlying watcher; dropped on shutdown.
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl StoreWatcher {
    /// Start watching the store directory.
    ///
    /// Spawns a background task that debounces change events and calls
    /// [`FileStore::reload`].
    pub fn start(
        store: Arc<FileStore>,
        shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(100);

        let watcher = Self::create_watcher(event_tx, &store)?;
        Self::spawn_reload_task(store, event_rx, shutdown_rx);

        Ok(Self {
            _watcher: Mutex::new(Some(watcher)),
        })
    }

    fn create_watcher(
        event_tx: mpsc::Sender<()>,
        store: &FileStore,
    ) -> Result<RecommendedWatcher> {
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let is_relevant = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) && event.paths.iter().any(|p| {
                        p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml")
                    });

                    if is_relevant {
                        debug!(paths = ?event.paths, kind = ?event.kind, "Store file change");
                        // Non-blocking send - if the channel is full a reload
                        // is already pending
                        let _ = event_tx.try_send(());
                    }
                }
                Err(e) => {
                    error!(error = %e, "Store watcher error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| crate::Error::Internal(format!("Failed to create store watcher: {e}")))?;

        watcher
            .watch(store.dir(), RecursiveMode::NonRecursive)
            .map_err(|e| crate::Error::Internal(format!("Failed to watch store dir: {e}")))?;
        info!(dir = %store.dir().display(), "Watching store for changes");

        Ok(watcher)
    }

    fn spawn_reload_task(
        store: Arc<FileStore>,
        mut event_rx: mpsc::Receiver<()>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            // Debounce: wait 500ms after the last event before reloading
            const DEBOUNCE_MS: u64 = 500;
            let mut last_event: Option<Instant> = None;
            let mut pending_reload = false;

            let mut interval = tokio::time::interval(Duration::from_millis(100));

            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        last_event = Some(Instant::now());
                        pending_reload = true;
                    }
                    _ = interval.tick() => {
                        if pending_reload
                            && last_event
                                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
                        {
                            pending_reload = false;
                            last_event = None;

                            match store.reload() {
                                Ok(()) => info!("Store hot-reload complete"),
                                Err(e) => {
                                    error!(error = %e, "Store hot-reload failed, keeping previous snapshot");
                                }
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Store watcher shutting down");
                        break;
                    }
                }
            }
        });
    }
}
