//! # Audio Cache Gateway
//!
//! Read-through cache in front of playback. A request for a song is served
//! from the store's audio table when present and fetched once otherwise.
//!
//! Requests are coalesced per song id: while a resolution for a song is in
//! flight, later callers await the same spawned task and receive the same
//! bytes. Requests for different songs run independently.
//!
//! Eviction only deletes audio rows, never one whose song is being fetched.
//! Handles own their `Bytes`, so eviction cannot cut a read short.

use crate::cache::config::{CacheConfig, EvictionPolicy};
use crate::cache::stats::CacheStats;
use crate::error::{AudioUnavailableReason, PlaybackError, Result};
use bridge_traits::{BridgeError, Clock, HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_async::sync::Mutex;
use core_async::task::spawn;
use core_async::time::{sleep, timeout};
use core_async::{BoxFuture, FutureExt, Shared};
use core_library::{AudioBlob, AudioBlobMeta, LibraryError, LocalStore, Song};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::NetworkStatusMonitor;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const HANDLE_URL_PREFIX: &str = "blob:setlist-offline/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleSource {
    Cache,
    Network,
}

/// Locally addressable audio for one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableHandle {
    pub song_id: String,
    /// `blob:setlist-offline/<song id>`
    pub url: String,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
    pub size: u64,
    pub source: HandleSource,
}

impl PlayableHandle {
    fn from_blob(blob: &AudioBlob, source: HandleSource) -> Self {
        Self {
            song_id: blob.meta.song_id.clone(),
            url: format!("{}{}", HANDLE_URL_PREFIX, blob.meta.song_id),
            bytes: blob.data.clone(),
            mime_type: blob.meta.mime_type.clone(),
            size: blob.data.len() as u64,
            source,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<PlayableHandle>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    network_fetches: AtomicU64,
    coalesced_requests: AtomicU64,
    evictions: AtomicU64,
}

struct GatewayInner {
    config: CacheConfig,
    store: Arc<dyn LocalStore>,
    http: Arc<dyn HttpClient>,
    network: Arc<NetworkStatusMonitor>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_fetch_id: AtomicU64,
    counters: Counters,
}

/// Cheap to clone; clones share the in-flight table and counters.
#[derive(Clone)]
pub struct AudioCacheGateway {
    inner: Arc<GatewayInner>,
}

impl AudioCacheGateway {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn LocalStore>,
        http: Arc<dyn HttpClient>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, store, http, network, clock, None)
    }

    pub fn with_event_bus(
        config: CacheConfig,
        store: Arc<dyn LocalStore>,
        http: Arc<dyn HttpClient>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self::build(config, store, http, network, clock, Some(event_bus))
    }

    fn build(
        config: CacheConfig,
        store: Arc<dyn LocalStore>,
        http: Arc<dyn HttpClient>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                config,
                store,
                http,
                network,
                clock,
                event_bus,
                in_flight: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Cache-or-fetch for one playback request.
    ///
    /// # Errors
    /// [`PlaybackError::AudioUnavailable`] when the song is not cached and
    /// cannot be fetched. Storage failures never fail the request; the
    /// handle is then served from memory.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn resolve_playable_url(&self, song: &Song) -> Result<PlayableHandle> {
        let fetch = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&song.id) {
                Some(existing) => {
                    self.inner
                        .counters
                        .coalesced_requests
                        .fetch_add(1, Ordering::Relaxed);
                    debug!("Joining in-flight audio request");
                    existing.fetch.clone()
                }
                None => {
                    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.start(id, song.clone());
                    in_flight.insert(
                        song.id.clone(),
                        InFlight {
                            id,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Drop one cached blob. Returns whether anything was removed.
    pub async fn invalidate(&self, song_id: &str) -> Result<bool> {
        let removed = self.inner.store.delete_audio_blob(song_id).await?;
        if removed {
            debug!(song_id, "Cached audio invalidated");
        }
        Ok(removed)
    }

    /// Drop every cached blob. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        let blobs = self.inner.store.list_audio_blobs().await?;
        let mut removed = 0usize;
        for meta in blobs {
            if self.inner.store.delete_audio_blob(&meta.song_id).await? {
                removed += 1;
            }
        }
        info!(removed, "Audio cache cleared");
        Ok(removed)
    }

    /// Evict until at most `max_bytes` remain. Manual policy evicts least
    /// recently used first.
    pub async fn evict_to(&self, max_bytes: u64) -> Result<usize> {
        Ok(self.inner.evict_down_to(max_bytes).await?)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let blobs = self.inner.store.list_audio_blobs().await?;
        let counters = &self.inner.counters;
        Ok(CacheStats {
            cached_songs: blobs.len(),
            total_bytes: blobs.iter().map(|m| m.size.max(0) as u64).sum(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            network_fetches: counters.network_fetches.load(Ordering::Relaxed),
            coalesced_requests: counters.coalesced_requests.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        })
    }

    /// Spawn the resolution. The task removes its own in-flight entry, so a
    /// finished fetch is never joined even if every caller went away.
    fn start(&self, id: u64, song: Song) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        let song_id = song.id.clone();
        let task = spawn(async move {
            let result = inner.resolve(&song).await;
            let mut in_flight = inner.in_flight.lock().await;
            if in_flight.get(&song.id).map(|f| f.id) == Some(id) {
                in_flight.remove(&song.id);
            }
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(song_id = %song_id, error = %e, "Audio fetch task ended abnormally");
                    Err(PlaybackError::unavailable(
                        song_id,
                        AudioUnavailableReason::Interrupted,
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl GatewayInner {
    async fn resolve(&self, song: &Song) -> Result<PlayableHandle> {
        if let Some(handle) = self.lookup(&song.id).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(song_id = %song.id, bytes = handle.size, "Audio cache hit");
            return Ok(handle);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        match self.fetch(song).await {
            Ok(response) => Ok(self.store_fetched(song, response).await),
            Err(reason) => {
                warn!(song_id = %song.id, %reason, "Audio unavailable");
                self.emit(CacheEvent::AudioFetchFailed {
                    song_id: song.id.clone(),
                    reason: reason.to_string(),
                });
                Err(PlaybackError::unavailable(song.id.clone(), reason))
            }
        }
    }

    /// Stored blob with a matching content hash. A corrupt entry is deleted
    /// and reported as a miss; a read failure is a miss too.
    async fn lookup(&self, song_id: &str) -> Option<PlayableHandle> {
        let blob = match self.store.get_audio_blob(song_id).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(song_id, error = %e, "Audio cache read failed, treating as miss");
                return None;
            }
        };

        if content_hash(&blob.data) != blob.meta.content_hash {
            warn!(song_id, "Cached audio failed hash check, discarding");
            if let Err(e) = self.store.delete_audio_blob(song_id).await {
                warn!(song_id, error = %e, "Could not delete corrupt audio");
            }
            return None;
        }

        let now = self.clock.unix_timestamp_millis();
        if let Err(e) = self.store.touch_audio_blob(song_id, now).await {
            debug!(song_id, error = %e, "Could not update audio access time");
        }
        Some(PlayableHandle::from_blob(&blob, HandleSource::Cache))
    }

    async fn fetch(
        &self,
        song: &Song,
    ) -> std::result::Result<HttpResponse, AudioUnavailableReason> {
        let url = song
            .audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(AudioUnavailableReason::NoSource)?;

        if !self.network.is_online() {
            return Err(AudioUnavailableReason::Offline);
        }

        let policy = self.config.retry_policy();
        let request = HttpRequest::get(url).timeout(self.config.fetch_timeout);
        let mut last = AudioUnavailableReason::Transport;

        for attempt in 1..=policy.max_attempts {
            self.counters.network_fetches.fetch_add(1, Ordering::Relaxed);
            let retryable = match timeout(
                self.config.fetch_timeout,
                self.http.execute(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => match check_response(&response) {
                    Ok(()) => return Ok(response),
                    Err((reason, retryable)) => {
                        last = reason;
                        retryable
                    }
                },
                Ok(Err(BridgeError::Offline(message))) => {
                    debug!(song_id = %song.id, %message, "Audio host unreachable");
                    return Err(AudioUnavailableReason::Offline);
                }
                Ok(Err(BridgeError::Timeout(_))) | Err(_) => {
                    last = AudioUnavailableReason::Timeout;
                    true
                }
                Ok(Err(e)) => {
                    debug!(song_id = %song.id, error = %e, "Audio transport failure");
                    last = AudioUnavailableReason::Transport;
                    true
                }
            };

            warn!(
                song_id = %song.id,
                attempt,
                max_attempts = policy.max_attempts,
                reason = %last,
                "Audio fetch attempt failed"
            );
            if !retryable || attempt == policy.max_attempts {
                break;
            }
            sleep(policy.delay_for(attempt)).await;
        }

        Err(last)
    }

    /// Persist a validated download. Storage trouble degrades to an
    /// uncached handle.
    async fn store_fetched(&self, song: &Song, response: HttpResponse) -> PlayableHandle {
        let now = self.clock.unix_timestamp_millis();
        let size = response.body.len() as u64;
        let blob = AudioBlob {
            meta: AudioBlobMeta {
                song_id: song.id.clone(),
                title: song.title.clone(),
                mime_type: response.content_type().map(str::to_string),
                size: size as i64,
                content_hash: content_hash(&response.body),
                fetched_at: now,
                last_accessed_at: now,
            },
            data: response.body,
        };
        let handle = PlayableHandle::from_blob(&blob, HandleSource::Network);

        if !self.make_room(&song.id, size).await {
            return handle;
        }

        let stored = match self.store.put_audio_blob(&blob).await {
            Err(LibraryError::QuotaExceeded(message))
                if self.config.eviction_policy != EvictionPolicy::Manual =>
            {
                warn!(song_id = %song.id, %message, "Storage quota hit, evicting and retrying once");
                match self.store.total_audio_bytes().await {
                    Ok(total) => {
                        if let Err(e) = self.evict_down_to(total.saturating_sub(size)).await {
                            warn!(song_id = %song.id, error = %e, "Eviction failed");
                        }
                    }
                    Err(e) => warn!(song_id = %song.id, error = %e, "Could not size audio cache"),
                }
                self.store.put_audio_blob(&blob).await
            }
            other => other,
        };

        match stored {
            Ok(()) => {
                info!(song_id = %song.id, bytes = size, "Audio cached");
                self.emit(CacheEvent::AudioCached {
                    song_id: song.id.clone(),
                    bytes: size,
                });
            }
            Err(e) => {
                warn!(song_id = %song.id, error = %e, "Audio not cached, serving from memory");
            }
        }
        handle
    }

    /// Whether a blob of `incoming` bytes should be written.
    async fn make_room(&self, song_id: &str, incoming: u64) -> bool {
        let max = self.config.max_bytes;
        if incoming > max {
            info!(song_id, bytes = incoming, max_bytes = max, "Audio larger than cache, not storing");
            return false;
        }
        let budget = max - incoming;

        if self.config.eviction_policy == EvictionPolicy::Manual {
            return match self.store.total_audio_bytes().await {
                Ok(total) if total <= budget => true,
                Ok(_) => {
                    info!(song_id, "Audio cache full under manual eviction, not storing");
                    false
                }
                Err(e) => {
                    warn!(song_id, error = %e, "Could not size audio cache");
                    false
                }
            };
        }

        match self.evict_down_to(budget).await {
            Ok(_) => true,
            Err(e) => {
                // The write decides; it degrades to memory on failure.
                warn!(song_id, error = %e, "Eviction failed");
                true
            }
        }
    }

    /// Delete audio rows in policy order until at most `target` bytes remain.
    async fn evict_down_to(&self, target: u64) -> core_library::Result<usize> {
        let mut total = self.store.total_audio_bytes().await?;
        if total <= target {
            return Ok(0);
        }

        let pinned: HashSet<String> = self.in_flight.lock().await.keys().cloned().collect();
        let mut candidates = self.store.list_audio_blobs().await?;
        order_for_eviction(&mut candidates, self.config.eviction_policy);

        let mut evicted = 0usize;
        for meta in candidates {
            if total <= target {
                break;
            }
            if pinned.contains(&meta.song_id) {
                continue;
            }
            if self.store.delete_audio_blob(&meta.song_id).await? {
                let bytes = meta.size.max(0) as u64;
                total = total.saturating_sub(bytes);
                evicted += 1;
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(song_id = %meta.song_id, bytes, "Audio evicted");
                self.emit(CacheEvent::AudioEvicted {
                    song_id: meta.song_id,
                    bytes,
                });
            }
        }

        if total > target {
            warn!(total, target, "Could not evict down to target");
        }
        Ok(evicted)
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(event)).ok();
        }
    }
}

/// `candidates` arrive least recently used first.
fn order_for_eviction(candidates: &mut [AudioBlobMeta], policy: EvictionPolicy) {
    match policy {
        EvictionPolicy::LeastRecentlyUsed | EvictionPolicy::Manual => {
            candidates.sort_by_key(|m| m.last_accessed_at)
        }
        EvictionPolicy::FirstInFirstOut => candidates.sort_by_key(|m| m.fetched_at),
        EvictionPolicy::LargestFirst => candidates.sort_by(|a, b| b.size.cmp(&a.size)),
    }
}

/// Rejects statuses, empty bodies and length mismatches. The flag says
/// whether another attempt could help.
fn check_response(
    response: &HttpResponse,
) -> std::result::Result<(), (AudioUnavailableReason, bool)> {
    if !response.is_success() {
        let retryable = response.is_server_error() || response.status == 429;
        return Err((AudioUnavailableReason::ServerError, retryable));
    }
    if response.body.is_empty() {
        return Err((AudioUnavailableReason::EmptyBody, true));
    }
    if let Some(declared) = response.content_length() {
        if declared != response.body.len() as u64 {
            return Err((AudioUnavailableReason::Truncated, true));
        }
    }
    Ok(())
}

fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
