//! Domain models for the offline setlist cache
//!
//! Songs, setlists and gigs are replicas of records owned by the remote
//! content API. Identifiers are server-assigned strings and never generated
//! locally.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
    /// Remote audio location. `None` for songs without a recording.
    pub audio_url: Option<String>,
    pub lyrics: Option<String>,
    /// Unix milliseconds.
    pub last_played_at: Option<i64>,
    /// Monotonically increasing per record on the remote side.
    pub version: i64,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            artwork_url: None,
            audio_url: None,
            lyrics: None,
            last_played_at: None,
            version: 0,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Song id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err(format!("Song {} has an empty title", self.id));
        }
        if self.version < 0 {
            return Err(format!("Song {} has a negative version", self.id));
        }
        Ok(())
    }
}

/// One slot in a setlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetlistItem {
    Song { song_id: String },
    /// A break in the set. Has no audio and references no song.
    Pause { label: Option<String> },
}

impl SetlistItem {
    pub fn song(song_id: impl Into<String>) -> Self {
        SetlistItem::Song {
            song_id: song_id.into(),
        }
    }

    pub fn pause() -> Self {
        SetlistItem::Pause { label: None }
    }

    pub fn song_id(&self) -> Option<&str> {
        match self {
            SetlistItem::Song { song_id } => Some(song_id),
            SetlistItem::Pause { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SetlistItem::Song { .. } => "song",
            SetlistItem::Pause { .. } => "pause",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setlist {
    pub id: String,
    pub title: String,
    /// Order is the setlist.
    pub items: Vec<SetlistItem>,
    pub version: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

impl Setlist {
    pub fn new(id: impl Into<String>, title: impl Into<String>, items: Vec<SetlistItem>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            items,
            version: 0,
            updated_at: 0,
        }
    }

    /// Song identifiers in set order, pauses skipped, duplicates kept.
    pub fn song_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(SetlistItem::song_id)
    }

    pub fn distinct_song_ids(&self) -> BTreeSet<&str> {
        self.song_ids().collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Setlist id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err(format!("Setlist {} has an empty title", self.id));
        }
        if self.song_ids().any(|id| id.trim().is_empty()) {
            return Err(format!("Setlist {} references an empty song id", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Gig {
    pub id: String,
    pub title: String,
    /// ISO-8601 date as sent by the remote.
    pub date: Option<String>,
    pub venue: Option<String>,
    pub setlist_id: Option<String>,
}

impl Gig {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Gig id cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Everything about a cached audio file except its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AudioBlobMeta {
    pub song_id: String,
    pub title: String,
    pub mime_type: Option<String>,
    pub size: i64,
    /// Lowercase hex SHA-256 of the payload.
    pub content_hash: String,
    pub fetched_at: i64,
    pub last_accessed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub meta: AudioBlobMeta,
    pub data: Bytes,
}

impl AudioBlob {
    pub fn validate(&self) -> Result<(), String> {
        if self.meta.song_id.trim().is_empty() {
            return Err("Audio blob song id cannot be empty".to_string());
        }
        if self.meta.size != self.data.len() as i64 {
            return Err(format!(
                "Audio blob for {} declares {} bytes but holds {}",
                self.meta.song_id,
                self.meta.size,
                self.data.len()
            ));
        }
        Ok(())
    }
}

/// Sync bookkeeping that must survive a restart.
///
/// `last_outcome` is opaque JSON owned by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PersistedSyncState {
    pub last_successful_sync: Option<i64>,
    pub last_attempt_at: Option<i64>,
    pub last_outcome: Option<String>,
}
