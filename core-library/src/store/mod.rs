//! Local Store
//!
//! Durable table-like storage for the catalog replica plus a separate binary
//! area for cached audio. Every write is one transaction, so readers never
//! observe a half-written record.
//!
//! Three implementations share the contract:
//!
//! - [`SqliteLocalStore`]: the durable store
//! - [`MemoryLocalStore`]: session-only store, also used as the fallback
//! - [`FailoverLocalStore`]: wraps a durable store and switches to memory on
//!   the first [`LibraryError::StorageUnavailable`](crate::LibraryError)

mod failover;
mod memory;
mod sqlite;

pub use failover::FailoverLocalStore;
pub use memory::MemoryLocalStore;
pub use sqlite::SqliteLocalStore;

use crate::error::Result;
use crate::models::{AudioBlob, AudioBlobMeta, Gig, PersistedSyncState, Setlist, Song};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Full cached catalog ordered by id. Empty if never populated.
    async fn get_all_songs(&self) -> Result<Vec<Song>>;

    /// Upsert by id, replacing every field of an existing record.
    async fn put_songs(&self, songs: &[Song]) -> Result<()>;

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>>;

    async fn find_setlist_by_title(&self, title: &str) -> Result<Option<Setlist>>;

    async fn get_all_setlists(&self) -> Result<Vec<Setlist>>;

    /// Upsert a setlist and replace its items.
    ///
    /// # Errors
    /// [`LibraryError::MissingSongs`](crate::LibraryError::MissingSongs) when
    /// an item references a song that is not stored. Nothing is written.
    async fn put_setlist(&self, setlist: &Setlist) -> Result<()>;

    async fn get_gigs(&self) -> Result<Vec<Gig>>;

    async fn put_gigs(&self, gigs: &[Gig]) -> Result<()>;

    async fn get_audio_blob(&self, song_id: &str) -> Result<Option<AudioBlob>>;

    async fn put_audio_blob(&self, blob: &AudioBlob) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete_audio_blob(&self, song_id: &str) -> Result<bool>;

    /// Metadata of every cached blob, least recently accessed first.
    async fn list_audio_blobs(&self) -> Result<Vec<AudioBlobMeta>>;

    async fn touch_audio_blob(&self, song_id: &str, accessed_at: i64) -> Result<()>;

    async fn total_audio_bytes(&self) -> Result<u64>;

    async fn load_sync_state(&self) -> Result<PersistedSyncState>;

    async fn save_sync_state(&self, state: &PersistedSyncState) -> Result<()>;

    /// Wipe every table atomically.
    async fn clear_all(&self) -> Result<()>;
}

/// Song ids referenced by `setlist` that `is_known` rejects, sorted and deduped.
pub(crate) fn missing_song_ids<F>(setlist: &Setlist, mut is_known: F) -> Vec<String>
where
    F: FnMut(&str) -> bool,
{
    setlist
        .distinct_song_ids()
        .into_iter()
        .filter(|id| !is_known(id))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn validate_songs(songs: &[Song]) -> Result<()> {
    for song in songs {
        song.validate()
            .map_err(|message| crate::LibraryError::invalid("Song", message))?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store implementation must share.

    use super::*;
    use crate::models::{AudioBlobMeta, SetlistItem};
    use crate::LibraryError;
    use bytes::Bytes;
    use proptest::prelude::*;

    pub fn song(id: &str) -> Song {
        Song::new(id, format!("Song {id}"))
            .with_artist("The Band")
            .with_audio_url(format!("https://cdn.example.com/{id}.mp3"))
            .with_version(1)
    }

    pub fn blob(song_id: &str, data: &'static [u8], accessed_at: i64) -> AudioBlob {
        AudioBlob {
            meta: AudioBlobMeta {
                song_id: song_id.to_string(),
                title: format!("Song {song_id}"),
                mime_type: Some("audio/mpeg".to_string()),
                size: data.len() as i64,
                content_hash: String::new(),
                fetched_at: accessed_at,
                last_accessed_at: accessed_at,
            },
            data: Bytes::from_static(data),
        }
    }

    pub async fn songs_round_trip(store: &dyn LocalStore) {
        assert!(store.get_all_songs().await.unwrap().is_empty());

        store.put_songs(&[song("b"), song("a")]).await.unwrap();
        let mut updated = song("a");
        updated.title = "Renamed".to_string();
        updated.artist = None;
        updated.version = 2;
        store.put_songs(&[updated.clone()]).await.unwrap();

        let songs = store.get_all_songs().await.unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0], updated, "upsert replaces every field");
        assert_eq!(songs[1].id, "b");

        store.put_songs(&[]).await.unwrap();
        assert_eq!(store.get_all_songs().await.unwrap().len(), 2);
    }

    pub async fn setlist_requires_songs(store: &dyn LocalStore) {
        store.put_songs(&[song("a")]).await.unwrap();

        let setlist = Setlist::new(
            "set-1",
            "Rehearsal",
            vec![
                SetlistItem::song("a"),
                SetlistItem::pause(),
                SetlistItem::song("x"),
                SetlistItem::song("y"),
            ],
        );
        let err = store.put_setlist(&setlist).await.unwrap_err();
        match err {
            LibraryError::MissingSongs { setlist_id, missing } => {
                assert_eq!(setlist_id, "set-1");
                assert_eq!(missing, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected MissingSongs, got {other:?}"),
        }
        assert!(store.get_setlist("set-1").await.unwrap().is_none());
    }

    pub async fn setlist_round_trip(store: &dyn LocalStore) {
        store
            .put_songs(&[song("a"), song("b"), song("c")])
            .await
            .unwrap();

        let mut setlist = Setlist::new(
            "set-1",
            "Rehearsal",
            vec![
                SetlistItem::song("c"),
                SetlistItem::Pause {
                    label: Some("Break".to_string()),
                },
                SetlistItem::song("a"),
            ],
        );
        setlist.version = 3;
        setlist.updated_at = 1_700_000_000_000;
        store.put_setlist(&setlist).await.unwrap();
        assert_eq!(store.get_setlist("set-1").await.unwrap(), Some(setlist.clone()));

        setlist.items = vec![SetlistItem::song("b")];
        store.put_setlist(&setlist).await.unwrap();
        assert_eq!(
            store.find_setlist_by_title("Rehearsal").await.unwrap(),
            Some(setlist.clone())
        );
        assert!(store.find_setlist_by_title("Gig").await.unwrap().is_none());
        assert_eq!(store.get_all_setlists().await.unwrap(), vec![setlist]);
    }

    pub async fn audio_lifecycle(store: &dyn LocalStore) {
        store.put_audio_blob(&blob("a", b"aaaa", 10)).await.unwrap();
        store.put_audio_blob(&blob("b", b"bb", 5)).await.unwrap();

        assert_eq!(store.total_audio_bytes().await.unwrap(), 6);
        let listed: Vec<_> = store
            .list_audio_blobs()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.song_id)
            .collect();
        assert_eq!(listed, vec!["b", "a"]);

        store.touch_audio_blob("b", 20).await.unwrap();
        let listed: Vec<_> = store
            .list_audio_blobs()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.song_id)
            .collect();
        assert_eq!(listed, vec!["a", "b"]);

        let fetched = store.get_audio_blob("a").await.unwrap().unwrap();
        assert_eq!(fetched.data, Bytes::from_static(b"aaaa"));

        assert!(store.delete_audio_blob("a").await.unwrap());
        assert!(!store.delete_audio_blob("a").await.unwrap());
        assert!(store.get_audio_blob("a").await.unwrap().is_none());
        assert_eq!(store.total_audio_bytes().await.unwrap(), 2);
    }

    pub async fn audio_rejects_inconsistent_blob(store: &dyn LocalStore) {
        let mut bad = blob("a", b"abc", 0);
        bad.meta.size = 10;
        assert!(store.put_audio_blob(&bad).await.is_err());
        assert!(store.get_audio_blob("a").await.unwrap().is_none());
    }

    pub async fn sync_state_round_trip(store: &dyn LocalStore) {
        assert_eq!(
            store.load_sync_state().await.unwrap(),
            PersistedSyncState::default()
        );
        let state = PersistedSyncState {
            last_successful_sync: Some(42),
            last_attempt_at: Some(43),
            last_outcome: Some("{\"status\":\"success\"}".to_string()),
        };
        store.save_sync_state(&state).await.unwrap();
        assert_eq!(store.load_sync_state().await.unwrap(), state);
    }

    pub async fn clear_all_wipes_everything(store: &dyn LocalStore) {
        store.put_songs(&[song("a")]).await.unwrap();
        store
            .put_setlist(&Setlist::new("s", "Rehearsal", vec![SetlistItem::song("a")]))
            .await
            .unwrap();
        store
            .put_gigs(&[Gig {
                id: "g".to_string(),
                title: "Club".to_string(),
                date: None,
                venue: None,
                setlist_id: Some("s".to_string()),
            }])
            .await
            .unwrap();
        store.put_audio_blob(&blob("a", b"x", 0)).await.unwrap();
        store
            .save_sync_state(&PersistedSyncState {
                last_successful_sync: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        store.clear_all().await.unwrap();

        assert!(store.get_all_songs().await.unwrap().is_empty());
        assert!(store.get_all_setlists().await.unwrap().is_empty());
        assert!(store.get_gigs().await.unwrap().is_empty());
        assert_eq!(store.total_audio_bytes().await.unwrap(), 0);
        assert_eq!(
            store.load_sync_state().await.unwrap(),
            PersistedSyncState::default()
        );
    }

    const POOL_SIZE: usize = 24;

    /// One write step: which pool songs get stored, which of four setlist
    /// slots is written, and its items (`None` is a pause).
    #[derive(Debug, Clone)]
    pub struct IntegrityRound {
        pub stored: Vec<bool>,
        pub slot: u8,
        pub items: Vec<Option<usize>>,
    }

    pub fn integrity_rounds() -> impl Strategy<Value = Vec<IntegrityRound>> {
        let round = (
            prop::collection::vec(prop::bool::weighted(0.6), POOL_SIZE),
            0u8..4,
            prop::collection::vec(prop::option::weighted(0.8, 0..POOL_SIZE), 0..12),
        )
            .prop_map(|(stored, slot, items)| IntegrityRound {
                stored,
                slot,
                items,
            });
        prop::collection::vec(round, 1..8)
    }

    /// Drive an async contract check from a synchronous proptest body.
    pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    /// After every write attempt, every stored setlist only references
    /// stored songs.
    pub async fn referential_integrity_holds(store: &dyn LocalStore, rounds: &[IntegrityRound]) {
        let pool: Vec<Song> = (0..POOL_SIZE).map(|i| song(&format!("song-{i:02}"))).collect();

        for round in rounds {
            let stored: Vec<Song> = pool
                .iter()
                .zip(&round.stored)
                .filter(|(_, keep)| **keep)
                .map(|(song, _)| song.clone())
                .collect();
            store.put_songs(&stored).await.unwrap();

            let items = round
                .items
                .iter()
                .map(|item| match item {
                    Some(index) => SetlistItem::song(pool[*index].id.clone()),
                    None => SetlistItem::pause(),
                })
                .collect();
            let setlist = Setlist::new(format!("set-{}", round.slot), "Random", items);
            let _ = store.put_setlist(&setlist).await;

            let known: BTreeSet<String> = store
                .get_all_songs()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.id)
                .collect();
            for stored_setlist in store.get_all_setlists().await.unwrap() {
                for id in stored_setlist.song_ids() {
                    assert!(
                        known.contains(id),
                        "setlist {} references unknown song {id}",
                        stored_setlist.id
                    );
                }
            }
        }
    }
}
