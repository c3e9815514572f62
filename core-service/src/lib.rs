//! Core service façade and bootstrap helpers.
//!
//! [`CoreService`] is the only surface pages and the player call. It wires
//! the Local Store, the remote content API, the network monitor, the sync
//! engine and the audio cache together, and runs the
//! [`OfflineDataInitializer`] at boot.
//!
//! Desktop apps enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`]; other hosts build a [`CoreConfig`] with their own
//! bridges and call [`CoreService::bootstrap`].

pub mod error;
pub mod initializer;

pub use error::{CoreError, Result};
pub use initializer::{InitDecision, InitializationReport, OfflineDataInitializer};

pub use core_library::{Gig, Setlist, SetlistItem, Song};
pub use core_playback::{AudioUnavailableReason, PlaybackError};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder};
pub use core_runtime::{ConnectionQuality, NetworkSnapshot};
pub use core_sync::{SyncOutcome, SyncReport, SyncState};

use bridge_traits::{Clock, HttpClient, SystemClock};
use core_async::sync::{broadcast, watch};
use core_async::time::timeout;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    FailoverLocalStore, LibraryError, LocalStore, MemoryLocalStore, RemoteDataSource,
    RemoteError, SqliteLocalStore,
};
use core_playback::{AudioCacheGateway, CacheConfig, CacheStats, PlayableHandle};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, DEFAULT_EVENT_BUFFER_SIZE};
use core_runtime::network::WatchHandle;
use core_runtime::{NetworkMonitorConfig, NetworkStatusMonitor};
use core_sync::{SyncConfig, SyncEngine};
use provider_content_api::{ContentApiClient, ContentApiConfig};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Everything the service needs from the outside.
#[derive(Clone)]
pub struct CoreDependencies {
    pub store: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteDataSource>,
    pub http_client: Arc<dyn HttpClient>,
    pub network: Arc<NetworkStatusMonitor>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
}

impl CoreDependencies {
    /// Bundle with the system clock and a fresh event bus.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteDataSource>,
        http_client: Arc<dyn HttpClient>,
        network: Arc<NetworkStatusMonitor>,
    ) -> Self {
        Self {
            store,
            remote,
            http_client,
            network,
            clock: Arc::new(SystemClock),
            event_bus: EventBus::new(DEFAULT_EVENT_BUFFER_SIZE),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }
}

struct ServiceInner {
    deps: CoreDependencies,
    sync: SyncEngine,
    audio: AudioCacheGateway,
    initializer: OfflineDataInitializer,
    _network_watch: Option<WatchHandle>,
}

/// Primary façade exposed to host applications. Cheap to clone.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Assemble the service from explicit dependencies.
    pub fn new(
        deps: CoreDependencies,
        sync_config: SyncConfig,
        cache_config: CacheConfig,
    ) -> Result<Self> {
        Self::assemble(deps, sync_config, cache_config, None)
    }

    /// Open storage, build the remote connector and start watching the
    /// network, all from one [`CoreConfig`].
    ///
    /// A database that cannot be opened degrades to a session-only memory
    /// store instead of failing.
    #[instrument(skip(config))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let event_bus = EventBus::new(config.event_buffer);

        let mut api_config = ContentApiConfig::new(config.remote_base_url.clone())
            .with_request_timeout(config.metadata_timeout);
        if let Some(token) = &config.api_token {
            api_config = api_config.with_api_token(token.clone());
        }
        let remote = ContentApiClient::new(Arc::clone(&config.http_client), api_config)
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let network = Arc::new(
            NetworkStatusMonitor::new(
                NetworkSnapshot::new(true, false),
                network_config(&config),
            )
            .with_event_bus(event_bus.clone()),
        );
        let snapshot = network.refresh(config.network_monitor.as_ref()).await;
        info!(online = snapshot.online, slow = snapshot.slow, "Initial network status");
        let watch = network.watch(Arc::clone(&config.network_monitor));

        let deps = CoreDependencies {
            store: open_store(&config).await,
            remote: Arc::new(remote),
            http_client: Arc::clone(&config.http_client),
            network,
            clock: Arc::new(SystemClock),
            event_bus,
        };

        Self::assemble(deps, sync_config(&config), cache_config(&config), Some(watch))
    }

    fn assemble(
        deps: CoreDependencies,
        sync_config: SyncConfig,
        cache_config: CacheConfig,
        network_watch: Option<WatchHandle>,
    ) -> Result<Self> {
        sync_config.validate().map_err(CoreError::InitializationFailed)?;
        cache_config.validate().map_err(CoreError::InitializationFailed)?;

        let sync = SyncEngine::with_event_bus(
            sync_config,
            Arc::clone(&deps.store),
            Arc::clone(&deps.remote),
            Arc::clone(&deps.network),
            Arc::clone(&deps.clock),
            deps.event_bus.clone(),
        );
        let audio = AudioCacheGateway::with_event_bus(
            cache_config,
            Arc::clone(&deps.store),
            Arc::clone(&deps.http_client),
            Arc::clone(&deps.network),
            Arc::clone(&deps.clock),
            deps.event_bus.clone(),
        );
        let initializer = OfflineDataInitializer::new(
            Arc::clone(&deps.store),
            sync.clone(),
            Arc::clone(&deps.network),
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                deps,
                sync,
                audio,
                initializer,
                _network_watch: network_watch,
            }),
        })
    }

    pub fn dependencies(&self) -> &CoreDependencies {
        &self.inner.deps
    }

    // ------------------------------------------------------------------
    // Boot
    // ------------------------------------------------------------------

    /// Run the boot decision once. See [`OfflineDataInitializer`].
    pub async fn initialize(&self) -> Result<InitializationReport> {
        self.inner.initializer.run().await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.initializer.is_ready()
    }

    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.inner.initializer.subscribe_ready()
    }

    pub async fn wait_ready(&self) {
        self.inner.initializer.wait_ready().await
    }

    pub fn initializer(&self) -> &OfflineDataInitializer {
        &self.inner.initializer
    }

    // ------------------------------------------------------------------
    // Cached reads
    // ------------------------------------------------------------------

    pub async fn get_all_songs_cached(&self) -> Result<Vec<Song>> {
        Ok(self.inner.deps.store.get_all_songs().await?)
    }

    pub async fn get_setlist_cached(&self, setlist_id: &str) -> Result<Option<Setlist>> {
        Ok(self.inner.deps.store.get_setlist(setlist_id).await?)
    }

    /// The setlist every sync refreshes, if cached.
    pub async fn get_active_setlist_cached(&self) -> Result<Option<Setlist>> {
        let title = &self.inner.sync.config().active_setlist_title;
        Ok(self.inner.deps.store.find_setlist_by_title(title).await?)
    }

    pub async fn get_gigs_cached(&self) -> Result<Vec<core_library::Gig>> {
        Ok(self.inner.deps.store.get_gigs().await?)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    pub fn needs_sync(&self) -> bool {
        self.inner.sync.needs_sync()
    }

    pub async fn fetch_and_store_data(&self) -> Result<SyncReport> {
        Ok(self.inner.sync.fetch_and_store_data().await?)
    }

    /// Never fails; inspect the report or [`CoreService::sync_state`].
    pub async fn sync_data(&self) -> SyncReport {
        self.inner.sync.sync_data().await
    }

    pub fn sync_state(&self) -> SyncState {
        self.inner.sync.state()
    }

    pub fn subscribe_sync_state(&self) -> watch::Receiver<SyncState> {
        self.inner.sync.subscribe_state()
    }

    // ------------------------------------------------------------------
    // Audio
    // ------------------------------------------------------------------

    pub async fn resolve_playable_url(&self, song: &Song) -> Result<PlayableHandle> {
        Ok(self.inner.audio.resolve_playable_url(song).await?)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.inner.audio.stats().await?)
    }

    // ------------------------------------------------------------------
    // Network and events
    // ------------------------------------------------------------------

    pub fn network_status(&self) -> NetworkSnapshot {
        self.inner.deps.network.current()
    }

    pub fn subscribe_network_status(&self) -> watch::Receiver<NetworkSnapshot> {
        self.inner.deps.network.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.inner.deps.event_bus.subscribe()
    }

    // ------------------------------------------------------------------
    // User edits
    // ------------------------------------------------------------------

    /// Replace a setlist's items, remote first, then the local setlist
    /// record. Songs and audio are left alone.
    ///
    /// # Errors
    /// - [`CoreError::Offline`] without a network
    /// - [`LibraryError::MissingSongs`] when an item names a song that is
    ///   not cached; the remote is not called
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn update_setlist_songs(
        &self,
        setlist_id: &str,
        items: Vec<SetlistItem>,
    ) -> Result<Setlist> {
        self.require_online("update_setlist_songs")?;

        let known: HashSet<String> = self
            .inner
            .deps
            .store
            .get_all_songs()
            .await?
            .into_iter()
            .map(|song| song.id)
            .collect();
        let mut missing: Vec<String> = items
            .iter()
            .filter_map(SetlistItem::song_id)
            .filter(|id| !known.contains(*id))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(LibraryError::MissingSongs {
                setlist_id: setlist_id.to_string(),
                missing,
            }
            .into());
        }

        let remote = Arc::clone(&self.inner.deps.remote);
        let updated = self
            .bounded(remote.update_setlist_songs(setlist_id, &items))
            .await?;
        self.inner.deps.store.put_setlist(&updated).await?;

        info!(setlist_id, items = updated.items.len(), "Setlist updated");
        self.inner
            .deps
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::SetlistUpdated {
                setlist_id: updated.id.clone(),
                items: updated.items.len() as u64,
            }))
            .ok();
        Ok(updated)
    }

    /// Send new lyrics to the remote. The local catalog picks them up through
    /// the background sync scheduled here.
    #[instrument(skip(self, lyrics))]
    pub async fn modify_lyrics(&self, song_id: &str, lyrics: &str) -> Result<Song> {
        self.require_online("modify_lyrics")?;
        let remote = Arc::clone(&self.inner.deps.remote);
        let song = self.bounded(remote.modify_lyrics(song_id, lyrics)).await?;
        drop(self.inner.sync.spawn_background_sync());
        Ok(song)
    }

    /// Wipe every local table and reset the sync state. Waits for an
    /// in-flight sync first; no sync can start until both are done.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        self.inner.sync.clear_local_data().await?;
        info!("Local cache cleared");
        self.inner
            .deps
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::CacheCleared))
            .ok();
        Ok(())
    }

    fn require_online(&self, operation: &str) -> Result<()> {
        if self.inner.deps.network.is_online() {
            Ok(())
        } else {
            Err(CoreError::Offline(format!("{operation} needs the network")))
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = core_library::RemoteResult<T>>,
    ) -> Result<T> {
        let limit = self.inner.sync.config().fetch_timeout;
        match timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RemoteError::Timeout(format!("no response within {limit:?}")).into()),
        }
    }
}

fn sync_config(config: &CoreConfig) -> SyncConfig {
    SyncConfig::default()
        .with_staleness_threshold(config.staleness_threshold)
        .with_fetch_timeout(config.metadata_timeout)
        .with_active_setlist_title(config.active_setlist_title.clone())
        .with_gigs(config.include_gigs)
}

fn cache_config(config: &CoreConfig) -> CacheConfig {
    CacheConfig::default()
        .with_max_bytes(config.audio_cache_max_bytes)
        .with_eviction_policy(config.eviction_policy)
        .with_fetch_timeout(config.audio_timeout)
        .with_fetch_attempts(config.audio_fetch_attempts)
}

fn network_config(config: &CoreConfig) -> NetworkMonitorConfig {
    NetworkMonitorConfig::default()
        .with_slow_bandwidth_kbps(config.slow_bandwidth_kbps)
        .with_slow_rtt(config.slow_rtt)
}

/// SQLite behind a failover wrapper, or memory when no path is configured
/// or the database cannot be opened.
async fn open_store(config: &CoreConfig) -> Arc<dyn LocalStore> {
    let Some(path) = &config.database_path else {
        info!("No database path configured, caching in memory for this session");
        return Arc::new(MemoryLocalStore::new());
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(path = %parent.display(), error = %e, "Could not create data directory");
        }
    }

    match create_pool(DatabaseConfig::new(path.clone())).await {
        Ok(pool) => {
            info!(path = %path.display(), "Opened local store");
            Arc::new(FailoverLocalStore::new(Arc::new(SqliteLocalStore::new(pool))))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Local store unavailable, using memory for this session");
            Arc::new(FailoverLocalStore::memory_only())
        }
    }
}

/// Convenience bootstrapper for desktop hosts: reqwest, the TCP reachability
/// monitor and a SQLite file in the platform data directory.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let core = core_service::bootstrap_desktop("https://api.example.com").await?;
/// let report = core.initialize().await?;
/// println!("{:?}, {} songs", report.decision, report.cached_songs);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(remote_base_url: impl Into<String>) -> Result<CoreService> {
    let config = CoreConfig::builder()
        .remote_base_url(remote_base_url)
        .build()?;
    CoreService::bootstrap(config).await
}
