use super::{missing_song_ids, validate_songs, LocalStore};
use crate::error::{LibraryError, Result};
use crate::models::{AudioBlob, AudioBlobMeta, Gig, PersistedSyncState, Setlist, Song};
use async_trait::async_trait;
use core_async::sync::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub songs: BTreeMap<String, Song>,
    pub setlists: BTreeMap<String, Setlist>,
    pub gigs: BTreeMap<String, Gig>,
    pub audio: BTreeMap<String, AudioBlob>,
    pub sync_state: PersistedSyncState,
}

/// Session-only Local Store.
///
/// One lock guards every table, so each operation is atomic with respect to
/// concurrent readers.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    tables: RwLock<Tables>,
    audio_quota_bytes: Option<u64>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject audio writes that would push the binary area past `bytes`.
    pub fn with_audio_quota(mut self, bytes: u64) -> Self {
        self.audio_quota_bytes = Some(bytes);
        self
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
            audio_quota_bytes: None,
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_all_songs(&self) -> Result<Vec<Song>> {
        Ok(self.tables.read().await.songs.values().cloned().collect())
    }

    async fn put_songs(&self, songs: &[Song]) -> Result<()> {
        validate_songs(songs)?;
        let mut tables = self.tables.write().await;
        for song in songs {
            tables.songs.insert(song.id.clone(), song.clone());
        }
        Ok(())
    }

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>> {
        Ok(self.tables.read().await.setlists.get(id).cloned())
    }

    async fn find_setlist_by_title(&self, title: &str) -> Result<Option<Setlist>> {
        let tables = self.tables.read().await;
        let found = tables
            .setlists
            .values()
            .filter(|s| s.title == title)
            .min_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)))
            .cloned();
        Ok(found)
    }

    async fn get_all_setlists(&self) -> Result<Vec<Setlist>> {
        Ok(self.tables.read().await.setlists.values().cloned().collect())
    }

    async fn put_setlist(&self, setlist: &Setlist) -> Result<()> {
        setlist
            .validate()
            .map_err(|message| LibraryError::invalid("Setlist", message))?;

        let mut tables = self.tables.write().await;
        let missing = missing_song_ids(setlist, |id| tables.songs.contains_key(id));
        if !missing.is_empty() {
            return Err(LibraryError::MissingSongs {
                setlist_id: setlist.id.clone(),
                missing,
            });
        }
        tables.setlists.insert(setlist.id.clone(), setlist.clone());
        Ok(())
    }

    async fn get_gigs(&self) -> Result<Vec<Gig>> {
        let mut gigs: Vec<Gig> = self.tables.read().await.gigs.values().cloned().collect();
        gigs.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(gigs)
    }

    async fn put_gigs(&self, gigs: &[Gig]) -> Result<()> {
        for gig in gigs {
            gig.validate()
                .map_err(|message| LibraryError::invalid("Gig", message))?;
        }
        let mut tables = self.tables.write().await;
        for gig in gigs {
            tables.gigs.insert(gig.id.clone(), gig.clone());
        }
        Ok(())
    }

    async fn get_audio_blob(&self, song_id: &str) -> Result<Option<AudioBlob>> {
        Ok(self.tables.read().await.audio.get(song_id).cloned())
    }

    async fn put_audio_blob(&self, blob: &AudioBlob) -> Result<()> {
        blob.validate()
            .map_err(|message| LibraryError::invalid("AudioBlob", message))?;

        let mut tables = self.tables.write().await;
        if let Some(quota) = self.audio_quota_bytes {
            let others: u64 = tables
                .audio
                .values()
                .filter(|b| b.meta.song_id != blob.meta.song_id)
                .map(|b| b.data.len() as u64)
                .sum();
            let needed = others + blob.data.len() as u64;
            if needed > quota {
                return Err(LibraryError::QuotaExceeded(format!(
                    "audio cache needs {needed} bytes, quota is {quota}"
                )));
            }
        }
        tables.audio.insert(blob.meta.song_id.clone(), blob.clone());
        Ok(())
    }

    async fn delete_audio_blob(&self, song_id: &str) -> Result<bool> {
        Ok(self.tables.write().await.audio.remove(song_id).is_some())
    }

    async fn list_audio_blobs(&self) -> Result<Vec<AudioBlobMeta>> {
        let mut metas: Vec<AudioBlobMeta> = self
            .tables
            .read()
            .await
            .audio
            .values()
            .map(|b| b.meta.clone())
            .collect();
        metas.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.song_id.cmp(&b.song_id))
        });
        Ok(metas)
    }

    async fn touch_audio_blob(&self, song_id: &str, accessed_at: i64) -> Result<()> {
        if let Some(blob) = self.tables.write().await.audio.get_mut(song_id) {
            blob.meta.last_accessed_at = accessed_at;
        }
        Ok(())
    }

    async fn total_audio_bytes(&self) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .await
            .audio
            .values()
            .map(|b| b.data.len() as u64)
            .sum())
    }

    async fn load_sync_state(&self) -> Result<PersistedSyncState> {
        Ok(self.tables.read().await.sync_state.clone())
    }

    async fn save_sync_state(&self, state: &PersistedSyncState) -> Result<()> {
        self.tables.write().await.sync_state = state.clone();
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        *self.tables.write().await = Tables::default();
        Ok(())
    }
}
