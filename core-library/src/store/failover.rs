use super::memory::Tables;
use super::{LocalStore, MemoryLocalStore};
use crate::error::{LibraryError, Result};
use crate::models::{AudioBlob, AudioBlobMeta, Gig, PersistedSyncState, Setlist, Song};
use async_trait::async_trait;
use core_async::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Durable store that degrades to memory for the rest of the session.
///
/// The first [`LibraryError::StorageUnavailable`] from the primary switches
/// every later call to a [`MemoryLocalStore`] seeded with whatever could
/// still be read. Other errors pass through untouched.
pub struct FailoverLocalStore {
    primary: Arc<dyn LocalStore>,
    fallback: Mutex<Option<Arc<MemoryLocalStore>>>,
    degraded: AtomicBool,
}

macro_rules! failover {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {{
        if let Some(fallback) = $self.fallback().await {
            return fallback.$method($($arg),*).await;
        }
        match $self.primary.$method($($arg),*).await {
            Err(err) if err.is_storage_unavailable() => {
                let fallback = $self.degrade(&err).await;
                fallback.$method($($arg),*).await
            }
            other => other,
        }
    }};
}

impl FailoverLocalStore {
    pub fn new(primary: Arc<dyn LocalStore>) -> Self {
        Self {
            primary,
            fallback: Mutex::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    /// Serve from memory from the start, e.g. when the database could not be opened.
    pub fn memory_only() -> Self {
        let memory = Arc::new(MemoryLocalStore::new());
        Self {
            primary: memory.clone(),
            fallback: Mutex::new(Some(memory)),
            degraded: AtomicBool::new(true),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    async fn fallback(&self) -> Option<Arc<MemoryLocalStore>> {
        if !self.is_degraded() {
            return None;
        }
        self.fallback.lock().await.clone()
    }

    async fn degrade(&self, cause: &LibraryError) -> Arc<MemoryLocalStore> {
        let mut slot = self.fallback.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }

        warn!(error = %cause, "Durable store unavailable, continuing in memory for this session");

        let mut tables = Tables::default();
        if let Ok(songs) = self.primary.get_all_songs().await {
            tables.songs = songs.into_iter().map(|s| (s.id.clone(), s)).collect();
        }
        if let Ok(setlists) = self.primary.get_all_setlists().await {
            tables.setlists = setlists
                .into_iter()
                .filter(|s| s.song_ids().all(|id| tables.songs.contains_key(id)))
                .map(|s| (s.id.clone(), s))
                .collect();
        }
        if let Ok(gigs) = self.primary.get_gigs().await {
            tables.gigs = gigs.into_iter().map(|g| (g.id.clone(), g)).collect();
        }
        if let Ok(state) = self.primary.load_sync_state().await {
            tables.sync_state = state;
        }
        info!(
            songs = tables.songs.len(),
            setlists = tables.setlists.len(),
            "Seeded in-memory store"
        );

        let fallback = Arc::new(MemoryLocalStore::from_tables(tables));
        *slot = Some(Arc::clone(&fallback));
        self.degraded.store(true, Ordering::SeqCst);
        fallback
    }
}

#[async_trait]
impl LocalStore for FailoverLocalStore {
    async fn get_all_songs(&self) -> Result<Vec<Song>> {
        failover!(self, get_all_songs())
    }

    async fn put_songs(&self, songs: &[Song]) -> Result<()> {
        failover!(self, put_songs(songs))
    }

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>> {
        failover!(self, get_setlist(id))
    }

    async fn find_setlist_by_title(&self, title: &str) -> Result<Option<Setlist>> {
        failover!(self, find_setlist_by_title(title))
    }

    async fn get_all_setlists(&self) -> Result<Vec<Setlist>> {
        failover!(self, get_all_setlists())
    }

    async fn put_setlist(&self, setlist: &Setlist) -> Result<()> {
        failover!(self, put_setlist(setlist))
    }

    async fn get_gigs(&self) -> Result<Vec<Gig>> {
        failover!(self, get_gigs())
    }

    async fn put_gigs(&self, gigs: &[Gig]) -> Result<()> {
        failover!(self, put_gigs(gigs))
    }

    async fn get_audio_blob(&self, song_id: &str) -> Result<Option<AudioBlob>> {
        failover!(self, get_audio_blob(song_id))
    }

    async fn put_audio_blob(&self, blob: &AudioBlob) -> Result<()> {
        failover!(self, put_audio_blob(blob))
    }

    async fn delete_audio_blob(&self, song_id: &str) -> Result<bool> {
        failover!(self, delete_audio_blob(song_id))
    }

    async fn list_audio_blobs(&self) -> Result<Vec<AudioBlobMeta>> {
        failover!(self, list_audio_blobs())
    }

    async fn touch_audio_blob(&self, song_id: &str, accessed_at: i64) -> Result<()> {
        failover!(self, touch_audio_blob(song_id, accessed_at))
    }

    async fn total_audio_bytes(&self) -> Result<u64> {
        failover!(self, total_audio_bytes())
    }

    async fn load_sync_state(&self) -> Result<PersistedSyncState> {
        failover!(self, load_sync_state())
    }

    async fn save_sync_state(&self, state: &PersistedSyncState) -> Result<()> {
        failover!(self, save_sync_state(state))
    }

    async fn clear_all(&self) -> Result<()> {
        failover!(self, clear_all())
    }
}
