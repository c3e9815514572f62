//! # Offline Data Initializer
//!
//! The boot-time decision, run once per application load:
//!
//! 1. Empty store and online: await a cold-start fetch.
//! 2. Online and the last sync is stale: start a background sync and return
//!    without waiting for it.
//! 3. Otherwise: proceed on whatever is cached.
//!
//! Every branch ends by flipping the ready flag, so the UI gate always
//! opens. A cold-start failure is reported, not raised.

use crate::error::{CoreError, Result};
use core_async::sync::watch;
use core_async::task::JoinHandle;
use core_library::LocalStore;
use core_runtime::NetworkStatusMonitor;
use core_sync::{SyncEngine, SyncError, SyncReport};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitDecision {
    /// Store was empty; a full fetch was awaited.
    ColdStartFetch,
    /// Cached data was used and a refresh runs detached.
    BackgroundSync,
    UseCache,
}

#[derive(Debug, Clone)]
pub struct InitializationReport {
    pub decision: InitDecision,
    /// Songs available once initialization returned.
    pub cached_songs: usize,
    /// Why the cold-start fetch failed, if it did.
    pub cold_start_error: Option<SyncError>,
}

pub struct OfflineDataInitializer {
    store: Arc<dyn LocalStore>,
    sync: SyncEngine,
    network: Arc<NetworkStatusMonitor>,
    started: AtomicBool,
    ready: watch::Sender<bool>,
    background: Mutex<Option<JoinHandle<SyncReport>>>,
}

impl OfflineDataInitializer {
    pub fn new(
        store: Arc<dyn LocalStore>,
        sync: SyncEngine,
        network: Arc<NetworkStatusMonitor>,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            store,
            sync,
            network,
            started: AtomicBool::new(false),
            ready,
            background: Mutex::new(None),
        }
    }

    /// Run the boot decision.
    ///
    /// # Errors
    /// [`CoreError::AlreadyInitialized`] on every call after the first.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<InitializationReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyInitialized);
        }

        self.sync.restore().await;
        let cached = self.count_songs().await;
        let online = self.network.is_online();

        let report = if cached == 0 && online {
            info!("Local store is empty, fetching catalog");
            let cold_start_error = match self.sync.fetch_and_store_data().await {
                Ok(report) => {
                    info!(songs = report.songs_written, "Cold start fetch completed");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Cold start fetch failed, continuing without data");
                    Some(e)
                }
            };
            InitializationReport {
                decision: InitDecision::ColdStartFetch,
                cached_songs: self.count_songs().await,
                cold_start_error,
            }
        } else if online && self.sync.needs_sync() {
            info!(cached, "Cached data is stale, refreshing in the background");
            let handle = self.sync.spawn_background_sync();
            if let Ok(mut slot) = self.background.lock() {
                *slot = Some(handle);
            }
            InitializationReport {
                decision: InitDecision::BackgroundSync,
                cached_songs: cached,
                cold_start_error: None,
            }
        } else {
            info!(cached, online, "Using cached data");
            InitializationReport {
                decision: InitDecision::UseCache,
                cached_songs: cached,
                cold_start_error: None,
            }
        };

        self.ready.send_replace(true);
        Ok(report)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Flips from `false` to `true` exactly once.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        ready.wait_for(|ready| *ready).await.ok();
    }

    /// The detached sync started by the background branch, once.
    pub fn take_background_sync(&self) -> Option<JoinHandle<SyncReport>> {
        self.background.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn count_songs(&self) -> usize {
        match self.store.get_all_songs().await {
            Ok(songs) => songs.len(),
            Err(e) => {
                warn!(error = %e, "Could not read cached songs");
                0
            }
        }
    }
}
