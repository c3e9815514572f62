//! Integration tests for the audio cache gateway
//!
//! - Read-through: miss, store, hit
//! - Per-song request coalescing
//! - Rejection of truncated and failed downloads
//! - Eviction and storage pressure

use async_trait::async_trait;
use bridge_traits::{BridgeError, HttpClient, HttpRequest, HttpResponse, ManualClock};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use core_library::{AudioBlob, AudioBlobMeta, LocalStore, MemoryLocalStore, Song};
use core_playback::{
    AudioCacheGateway, AudioUnavailableReason, CacheConfig, EvictionPolicy, HandleSource,
    PlaybackError,
};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::{NetworkMonitorConfig, NetworkSnapshot, NetworkStatusMonitor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test doubles
// ============================================================================

enum Reply {
    Response(HttpResponse),
    Error(fn() -> BridgeError),
}

#[derive(Default)]
struct MockHttp {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
}

impl MockHttp {
    fn serve(&self, url: &str, body: &'static [u8]) {
        let response = HttpResponse::new(200, Bytes::from_static(body))
            .with_header("Content-Type", "audio/mpeg")
            .with_header("Content-Length", body.len().to_string());
        self.reply(url, Reply::Response(response));
    }

    fn reply(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match self.replies.lock().unwrap().get(&request.url) {
            Some(Reply::Response(response)) => Ok(response.clone()),
            Some(Reply::Error(make)) => Err(make()),
            None => Ok(HttpResponse::new(404, Bytes::new())),
        }
    }
}

struct Harness {
    gateway: AudioCacheGateway,
    store: Arc<MemoryLocalStore>,
    http: Arc<MockHttp>,
    network: Arc<NetworkStatusMonitor>,
    clock: Arc<ManualClock>,
    events: EventBus,
}

impl Harness {
    fn new(config: CacheConfig) -> Self {
        Self::with_store(config, MemoryLocalStore::new())
    }

    fn with_store(config: CacheConfig, store: MemoryLocalStore) -> Self {
        let store = Arc::new(store);
        let http = Arc::new(MockHttp::default());
        let network = Arc::new(NetworkStatusMonitor::new(
            NetworkSnapshot::new(true, false),
            NetworkMonitorConfig::default(),
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap(),
        ));
        let events = EventBus::new(64);
        let gateway = AudioCacheGateway::with_event_bus(
            config.with_retry_base_delay(Duration::from_millis(1)),
            store.clone(),
            http.clone(),
            network.clone(),
            clock.clone(),
            events.clone(),
        );
        Self {
            gateway,
            store,
            http,
            network,
            clock,
            events,
        }
    }

    fn tick(&self) {
        self.clock.advance(ChronoDuration::seconds(1));
    }
}

fn song(id: &str) -> Song {
    Song::new(id, format!("Title {id}")).with_audio_url(url(id))
}

fn url(id: &str) -> String {
    format!("https://cdn.example.com/{id}.mp3")
}

fn unavailable_reason(result: Result<core_playback::PlayableHandle, PlaybackError>) -> AudioUnavailableReason {
    match result {
        Err(PlaybackError::AudioUnavailable { reason, .. }) => reason,
        other => panic!("expected AudioUnavailable, got {other:?}"),
    }
}

// ============================================================================
// Read-through
// ============================================================================

#[tokio::test]
async fn test_miss_fetches_and_stores_then_hits() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"ID3-audio-a");

    let first = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(first.source, HandleSource::Network);
    assert_eq!(first.url, "blob:setlist-offline/a");
    assert_eq!(first.bytes, Bytes::from_static(b"ID3-audio-a"));
    assert_eq!(first.mime_type.as_deref(), Some("audio/mpeg"));

    let stored = h.store.get_audio_blob("a").await.unwrap().unwrap();
    assert_eq!(stored.data, first.bytes);

    let second = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(second.source, HandleSource::Cache);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(h.http.calls(), 1);

    let stats = h.gateway.stats().await.unwrap();
    assert_eq!(stats.cached_songs, 1);
    assert_eq!(stats.total_bytes, 11);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.network_fetches, 1);
}

#[tokio::test]
async fn test_cached_audio_plays_offline() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"abcd");
    h.gateway.resolve_playable_url(&song("a")).await.unwrap();

    h.network.set_online(false);
    let handle = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(handle.source, HandleSource::Cache);
    assert_eq!(h.http.calls(), 1);
}

#[tokio::test]
async fn test_hit_updates_access_time() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"abcd");
    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    let fetched_at = h.store.list_audio_blobs().await.unwrap()[0].last_accessed_at;

    h.tick();
    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    let touched = h.store.list_audio_blobs().await.unwrap()[0].last_accessed_at;
    assert_eq!(touched, fetched_at + 1000);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_refetched() {
    let h = Harness::new(CacheConfig::default());
    h.store
        .put_audio_blob(&AudioBlob {
            meta: AudioBlobMeta {
                song_id: "a".to_string(),
                title: "Title a".to_string(),
                mime_type: None,
                size: 4,
                content_hash: "not-the-hash".to_string(),
                fetched_at: 0,
                last_accessed_at: 0,
            },
            data: Bytes::from_static(b"junk"),
        })
        .await
        .unwrap();
    h.http.serve(&url("a"), b"good audio");

    let handle = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(handle.source, HandleSource::Network);
    assert_eq!(handle.bytes, Bytes::from_static(b"good audio"));
    let stored = h.store.get_audio_blob("a").await.unwrap().unwrap();
    assert_eq!(stored.data, Bytes::from_static(b"good audio"));
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"shared bytes");
    let target = song("a");

    let (first, second) = tokio::join!(
        h.gateway.resolve_playable_url(&target),
        h.gateway.resolve_playable_url(&target)
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(h.http.calls(), 1);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.source, HandleSource::Network);
    assert_eq!(second.source, HandleSource::Network);
    assert_eq!(h.gateway.stats().await.unwrap().coalesced_requests, 1);
}

#[tokio::test]
async fn test_different_songs_fetch_independently() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"aaaa");
    h.http.serve(&url("b"), b"bbbb");

    let (song_a, song_b) = (song("a"), song("b"));
    let (a, b) = tokio::join!(
        h.gateway.resolve_playable_url(&song_a),
        h.gateway.resolve_playable_url(&song_b)
    );
    assert_eq!(a.unwrap().bytes, Bytes::from_static(b"aaaa"));
    assert_eq!(b.unwrap().bytes, Bytes::from_static(b"bbbb"));
    assert_eq!(h.http.calls(), 2);
    assert_eq!(h.gateway.stats().await.unwrap().coalesced_requests, 0);
}

#[tokio::test]
async fn test_failed_fetch_is_not_reused() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(1));
    let first = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(first), AudioUnavailableReason::ServerError);

    h.http.serve(&url("a"), b"now it exists");
    let second = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(second.bytes, Bytes::from_static(b"now it exists"));
    assert_eq!(h.http.calls(), 2);
}

// ============================================================================
// Failed downloads
// ============================================================================

#[tokio::test]
async fn test_truncated_download_is_rejected_and_not_stored() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(2));
    let short = HttpResponse::new(200, Bytes::from_static(b"12345"))
        .with_header("Content-Length", "10");
    h.http.reply(&url("a"), Reply::Response(short));
    let mut events = h.events.subscribe();

    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::Truncated);
    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
    assert_eq!(h.http.calls(), 2);

    match events.recv().await.unwrap() {
        CoreEvent::Cache(CacheEvent::AudioFetchFailed { song_id, reason }) => {
            assert_eq!(song_id, "a");
            assert_eq!(reason, "truncated");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(1));
    h.http
        .reply(&url("a"), Reply::Response(HttpResponse::new(200, Bytes::new())));

    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::EmptyBody);
    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(3));
    let result = h.gateway.resolve_playable_url(&song("missing")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::ServerError);
    assert_eq!(h.http.calls(), 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(3));
    h.http
        .reply(&url("a"), Reply::Response(HttpResponse::new(503, Bytes::new())));
    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::ServerError);
    assert_eq!(h.http.calls(), 3);
}

#[tokio::test]
async fn test_transport_timeout_is_classified() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(2));
    h.http.reply(
        &url("a"),
        Reply::Error(|| BridgeError::Timeout("read timed out".to_string())),
    );
    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::Timeout);
    assert_eq!(h.http.calls(), 2);
}

#[tokio::test]
async fn test_unreachable_host_fails_as_offline() {
    let h = Harness::new(CacheConfig::default().with_fetch_attempts(3));
    h.http.reply(
        &url("a"),
        Reply::Error(|| BridgeError::Offline("dns failure".to_string())),
    );
    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::Offline);
    assert_eq!(h.http.calls(), 1);
}

#[tokio::test]
async fn test_offline_miss_does_not_fetch() {
    let h = Harness::new(CacheConfig::default());
    h.http.serve(&url("a"), b"abcd");
    h.network.set_online(false);

    let result = h.gateway.resolve_playable_url(&song("a")).await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::Offline);
    assert_eq!(h.http.calls(), 0);
}

#[tokio::test]
async fn test_song_without_audio_url() {
    let h = Harness::new(CacheConfig::default());
    let result = h
        .gateway
        .resolve_playable_url(&Song::new("silent", "Intro talk"))
        .await;
    assert_eq!(unavailable_reason(result), AudioUnavailableReason::NoSource);
    assert_eq!(h.http.calls(), 0);
}

// ============================================================================
// Eviction and storage pressure
// ============================================================================

#[tokio::test]
async fn test_lru_eviction_makes_room() {
    let h = Harness::new(CacheConfig::default().with_max_bytes(10));
    for id in ["a", "b", "c"] {
        h.http.serve(&url(id), b"1234");
    }
    let mut events = h.events.subscribe();

    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("b")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("c")).await.unwrap();

    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
    assert!(h.store.get_audio_blob("b").await.unwrap().is_some());
    assert!(h.store.get_audio_blob("c").await.unwrap().is_some());
    assert_eq!(h.store.total_audio_bytes().await.unwrap(), 8);
    assert_eq!(h.gateway.stats().await.unwrap().evictions, 1);

    let mut evicted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Cache(CacheEvent::AudioEvicted { song_id, bytes }) = event {
            evicted.push((song_id, bytes));
        }
    }
    assert_eq!(evicted, vec![("a".to_string(), 4)]);
}

#[tokio::test]
async fn test_recently_played_song_survives_eviction() {
    let h = Harness::new(CacheConfig::default().with_max_bytes(10));
    for id in ["a", "b", "c"] {
        h.http.serve(&url(id), b"1234");
    }

    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("b")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("c")).await.unwrap();

    assert!(h.store.get_audio_blob("a").await.unwrap().is_some());
    assert!(h.store.get_audio_blob("b").await.unwrap().is_none());
}

#[tokio::test]
async fn test_manual_policy_serves_uncached_when_full() {
    let h = Harness::new(
        CacheConfig::default()
            .with_max_bytes(6)
            .with_eviction_policy(EvictionPolicy::Manual),
    );
    h.http.serve(&url("a"), b"1234");
    h.http.serve(&url("b"), b"5678");

    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    let b = h.gateway.resolve_playable_url(&song("b")).await.unwrap();
    assert_eq!(b.source, HandleSource::Network);
    assert!(h.store.get_audio_blob("a").await.unwrap().is_some());
    assert!(h.store.get_audio_blob("b").await.unwrap().is_none());

    assert_eq!(h.gateway.evict_to(0).await.unwrap(), 1);
    assert_eq!(h.store.total_audio_bytes().await.unwrap(), 0);
}

#[tokio::test]
async fn test_quota_exceeded_evicts_and_retries_once() {
    let h = Harness::with_store(
        CacheConfig::default().with_max_bytes(100),
        MemoryLocalStore::new().with_audio_quota(8),
    );
    for id in ["a", "b", "c"] {
        h.http.serve(&url(id), b"1234");
    }

    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("b")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("c")).await.unwrap();

    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
    assert!(h.store.get_audio_blob("c").await.unwrap().is_some());
}

#[tokio::test]
async fn test_storage_failure_serves_from_memory() {
    let h = Harness::with_store(
        CacheConfig::default(),
        MemoryLocalStore::new().with_audio_quota(2),
    );
    h.http.serve(&url("a"), b"too big for the store");

    let handle = h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    assert_eq!(handle.source, HandleSource::Network);
    assert_eq!(handle.bytes, Bytes::from_static(b"too big for the store"));
    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_eviction_never_touches_songs_table() {
    let h = Harness::new(CacheConfig::default().with_max_bytes(4));
    h.store.put_songs(&[song("a"), song("b")]).await.unwrap();
    h.http.serve(&url("a"), b"1234");
    h.http.serve(&url("b"), b"5678");

    h.gateway.resolve_playable_url(&song("a")).await.unwrap();
    h.tick();
    h.gateway.resolve_playable_url(&song("b")).await.unwrap();

    assert_eq!(h.store.get_all_songs().await.unwrap().len(), 2);
    assert!(h.store.get_audio_blob("a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_and_clear() {
    let h = Harness::new(CacheConfig::default());
    for id in ["a", "b", "c"] {
        h.http.serve(&url(id), b"1234");
        h.gateway.resolve_playable_url(&song(id)).await.unwrap();
    }

    assert!(h.gateway.invalidate("a").await.unwrap());
    assert!(!h.gateway.invalidate("a").await.unwrap());
    assert_eq!(h.gateway.clear().await.unwrap(), 2);

    let stats = h.gateway.stats().await.unwrap();
    assert_eq!(stats.cached_songs, 0);
    assert_eq!(stats.total_bytes, 0);
}
