use super::{missing_song_ids, validate_songs, LocalStore};
use crate::error::{LibraryError, Result};
use crate::models::{AudioBlob, AudioBlobMeta, Gig, PersistedSyncState, Setlist, SetlistItem, Song};
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::SqliteRow;
use sqlx::{query, query_as, Row, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};

const AUDIO_META_COLUMNS: &str =
    "song_id, title, mime_type, size, content_hash, fetched_at, last_accessed_at";

/// Durable Local Store on SQLite.
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn items_for(&self, setlist_ids: &[String]) -> Result<BTreeMap<String, Vec<SetlistItem>>> {
        let mut grouped: BTreeMap<String, Vec<SetlistItem>> = BTreeMap::new();
        if setlist_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = query(
            "SELECT setlist_id, kind, song_id, label FROM setlist_items ORDER BY setlist_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let setlist_id: String = row.try_get("setlist_id")?;
            if !setlist_ids.contains(&setlist_id) {
                continue;
            }
            let item = item_from_row(&row)?;
            grouped.entry(setlist_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn load_setlists(&self, rows: Vec<SqliteRow>) -> Result<Vec<Setlist>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.items_for(&ids).await?;

        rows.into_iter()
            .map(|row| -> Result<Setlist> {
                let id: String = row.try_get("id")?;
                Ok(Setlist {
                    items: items.remove(&id).unwrap_or_default(),
                    title: row.try_get("title")?,
                    version: row.try_get("version")?,
                    updated_at: row.try_get("updated_at")?,
                    id,
                })
            })
            .collect()
    }
}

fn item_from_row(row: &SqliteRow) -> Result<SetlistItem> {
    let kind: String = row.try_get("kind")?;
    match kind.as_str() {
        "song" => Ok(SetlistItem::Song {
            song_id: row.try_get("song_id")?,
        }),
        "pause" => Ok(SetlistItem::Pause {
            label: row.try_get("label")?,
        }),
        other => Err(LibraryError::Serialization(format!(
            "unknown setlist item kind '{other}'"
        ))),
    }
}

fn blob_from_row(row: &SqliteRow) -> Result<AudioBlob> {
    let data: Vec<u8> = row.try_get("data")?;
    Ok(AudioBlob {
        meta: AudioBlobMeta {
            song_id: row.try_get("song_id")?,
            title: row.try_get("title")?,
            mime_type: row.try_get("mime_type")?,
            size: row.try_get("size")?,
            content_hash: row.try_get("content_hash")?,
            fetched_at: row.try_get("fetched_at")?,
            last_accessed_at: row.try_get("last_accessed_at")?,
        },
        data: Bytes::from(data),
    })
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get_all_songs(&self) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>("SELECT * FROM songs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(songs)
    }

    #[instrument(skip(self, songs), fields(count = songs.len()))]
    async fn put_songs(&self, songs: &[Song]) -> Result<()> {
        if songs.is_empty() {
            return Ok(());
        }
        validate_songs(songs)?;

        let mut tx = self.pool.begin().await?;
        for song in songs {
            query(
                r#"
                INSERT INTO songs (id, title, artist, artwork_url, audio_url, lyrics, last_played_at, version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    artist = excluded.artist,
                    artwork_url = excluded.artwork_url,
                    audio_url = excluded.audio_url,
                    lyrics = excluded.lyrics,
                    last_played_at = excluded.last_played_at,
                    version = excluded.version
                "#,
            )
            .bind(&song.id)
            .bind(&song.title)
            .bind(&song.artist)
            .bind(&song.artwork_url)
            .bind(&song.audio_url)
            .bind(&song.lyrics)
            .bind(song.last_played_at)
            .bind(song.version)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Songs written");
        Ok(())
    }

    async fn get_setlist(&self, id: &str) -> Result<Option<Setlist>> {
        let rows = query("SELECT id, title, version, updated_at FROM setlists WHERE id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.load_setlists(rows).await?.into_iter().next())
    }

    async fn find_setlist_by_title(&self, title: &str) -> Result<Option<Setlist>> {
        let rows = query(
            "SELECT id, title, version, updated_at FROM setlists WHERE title = ? ORDER BY updated_at DESC, id LIMIT 1",
        )
        .bind(title)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.load_setlists(rows).await?.into_iter().next())
    }

    async fn get_all_setlists(&self) -> Result<Vec<Setlist>> {
        let rows = query("SELECT id, title, version, updated_at FROM setlists ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        self.load_setlists(rows).await
    }

    #[instrument(skip(self, setlist), fields(setlist_id = %setlist.id, items = setlist.items.len()))]
    async fn put_setlist(&self, setlist: &Setlist) -> Result<()> {
        setlist
            .validate()
            .map_err(|message| LibraryError::invalid("Setlist", message))?;

        let mut tx = self.pool.begin().await?;

        let mut known = HashSet::new();
        for id in setlist.distinct_song_ids() {
            let exists = query("SELECT 1 FROM songs WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if exists {
                known.insert(id.to_string());
            }
        }
        let missing = missing_song_ids(setlist, |id| known.contains(id));
        if !missing.is_empty() {
            warn!(missing = ?missing, "Rejecting setlist with unknown songs");
            return Err(LibraryError::MissingSongs {
                setlist_id: setlist.id.clone(),
                missing,
            });
        }

        query(
            r#"
            INSERT INTO setlists (id, title, version, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&setlist.id)
        .bind(&setlist.title)
        .bind(setlist.version)
        .bind(setlist.updated_at)
        .execute(&mut *tx)
        .await?;

        query("DELETE FROM setlist_items WHERE setlist_id = ?")
            .bind(&setlist.id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in setlist.items.iter().enumerate() {
            let (song_id, label) = match item {
                SetlistItem::Song { song_id } => (Some(song_id.as_str()), None),
                SetlistItem::Pause { label } => (None, label.as_deref()),
            };
            query(
                "INSERT INTO setlist_items (setlist_id, position, kind, song_id, label) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&setlist.id)
            .bind(position as i64)
            .bind(item.kind())
            .bind(song_id)
            .bind(label)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Setlist written");
        Ok(())
    }

    async fn get_gigs(&self) -> Result<Vec<Gig>> {
        let gigs = query_as::<_, Gig>(
            "SELECT id, title, date, venue, setlist_id FROM gigs ORDER BY date, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(gigs)
    }

    #[instrument(skip(self, gigs), fields(count = gigs.len()))]
    async fn put_gigs(&self, gigs: &[Gig]) -> Result<()> {
        if gigs.is_empty() {
            return Ok(());
        }
        for gig in gigs {
            gig.validate()
                .map_err(|message| LibraryError::invalid("Gig", message))?;
        }

        let mut tx = self.pool.begin().await?;
        for gig in gigs {
            query(
                r#"
                INSERT INTO gigs (id, title, date, venue, setlist_id) VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    date = excluded.date,
                    venue = excluded.venue,
                    setlist_id = excluded.setlist_id
                "#,
            )
            .bind(&gig.id)
            .bind(&gig.title)
            .bind(&gig.date)
            .bind(&gig.venue)
            .bind(&gig.setlist_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_audio_blob(&self, song_id: &str) -> Result<Option<AudioBlob>> {
        let row = query(&format!(
            "SELECT {AUDIO_META_COLUMNS}, data FROM audio_blobs WHERE song_id = ?"
        ))
        .bind(song_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(blob_from_row).transpose()
    }

    #[instrument(skip(self, blob), fields(song_id = %blob.meta.song_id, bytes = blob.data.len()))]
    async fn put_audio_blob(&self, blob: &AudioBlob) -> Result<()> {
        blob.validate()
            .map_err(|message| LibraryError::invalid("AudioBlob", message))?;

        query(
            r#"
            INSERT INTO audio_blobs (song_id, title, mime_type, size, content_hash, fetched_at, last_accessed_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(song_id) DO UPDATE SET
                title = excluded.title,
                mime_type = excluded.mime_type,
                size = excluded.size,
                content_hash = excluded.content_hash,
                fetched_at = excluded.fetched_at,
                last_accessed_at = excluded.last_accessed_at,
                data = excluded.data
            "#,
        )
        .bind(&blob.meta.song_id)
        .bind(&blob.meta.title)
        .bind(&blob.meta.mime_type)
        .bind(blob.meta.size)
        .bind(&blob.meta.content_hash)
        .bind(blob.meta.fetched_at)
        .bind(blob.meta.last_accessed_at)
        .bind(blob.data.as_ref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_audio_blob(&self, song_id: &str) -> Result<bool> {
        let result = query("DELETE FROM audio_blobs WHERE song_id = ?")
            .bind(song_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_audio_blobs(&self) -> Result<Vec<AudioBlobMeta>> {
        let metas = query_as::<_, AudioBlobMeta>(&format!(
            "SELECT {AUDIO_META_COLUMNS} FROM audio_blobs ORDER BY last_accessed_at, song_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(metas)
    }

    async fn touch_audio_blob(&self, song_id: &str, accessed_at: i64) -> Result<()> {
        query("UPDATE audio_blobs SET last_accessed_at = ? WHERE song_id = ?")
            .bind(accessed_at)
            .bind(song_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn total_audio_bytes(&self) -> Result<u64> {
        let total: i64 = query("SELECT COALESCE(SUM(size), 0) AS total FROM audio_blobs")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn load_sync_state(&self) -> Result<PersistedSyncState> {
        let state = query_as::<_, PersistedSyncState>(
            "SELECT last_successful_sync, last_attempt_at, last_outcome FROM sync_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(state.unwrap_or_default())
    }

    async fn save_sync_state(&self, state: &PersistedSyncState) -> Result<()> {
        query(
            r#"
            INSERT INTO sync_state (id, last_successful_sync, last_attempt_at, last_outcome)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_successful_sync = excluded.last_successful_sync,
                last_attempt_at = excluded.last_attempt_at,
                last_outcome = excluded.last_outcome
            "#,
        )
        .bind(state.last_successful_sync)
        .bind(state.last_attempt_at)
        .bind(&state.last_outcome)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "setlist_items",
            "setlists",
            "gigs",
            "songs",
            "audio_blobs",
            "sync_state",
        ] {
            query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("Local store cleared");
        Ok(())
    }
}
