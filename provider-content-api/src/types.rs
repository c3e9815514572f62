//! Content API wire types
//!
//! JSON shapes exchanged with the content API and their conversion into the
//! library's domain models. Timestamps travel as RFC 3339 strings and are
//! stored as Unix milliseconds.

use chrono::DateTime;
use core_library::{Gig, Setlist, SetlistItem, Song};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDto {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,

    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played_at: Option<String>,

    #[serde(default)]
    pub version: i64,
}

/// One entry of a setlist on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SetlistEntryDto {
    Song {
        #[serde(rename = "songId")]
        song_id: String,
    },
    Pause {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetlistDto {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub songs: Vec<SetlistEntryDto>,

    #[serde(default)]
    pub version: i64,

    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GigDto {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setlist_id: Option<String>,
}

/// `PUT /setlists/{id}/songs` body
#[derive(Debug, Serialize)]
pub struct UpdateSetlistSongsRequest<'a> {
    pub songs: &'a [SetlistEntryDto],
}

/// `PATCH /songs/{id}/lyrics` body
#[derive(Debug, Serialize)]
pub struct ModifyLyricsRequest<'a> {
    pub lyrics: &'a str,
}

/// `GET /setlists?title=` answers with either a list or a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SetlistLookupResponse {
    Many(Vec<SetlistDto>),
    One(SetlistDto),
}

impl SetlistLookupResponse {
    pub fn into_first(self) -> Option<SetlistDto> {
        match self {
            SetlistLookupResponse::Many(list) => list.into_iter().next(),
            SetlistLookupResponse::One(setlist) => Some(setlist),
        }
    }
}

/// Parse an RFC 3339 timestamp to Unix milliseconds.
pub fn parse_timestamp_millis(rfc3339: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

impl From<SongDto> for Song {
    fn from(dto: SongDto) -> Self {
        Song {
            id: dto.id,
            title: dto.title,
            artist: dto.artist,
            artwork_url: dto.artwork_url,
            audio_url: dto.audio_url,
            lyrics: dto.lyrics,
            last_played_at: dto.last_played_at.as_deref().and_then(parse_timestamp_millis),
            version: dto.version,
        }
    }
}

impl From<SetlistEntryDto> for SetlistItem {
    fn from(dto: SetlistEntryDto) -> Self {
        match dto {
            SetlistEntryDto::Song { song_id } => SetlistItem::Song { song_id },
            SetlistEntryDto::Pause { label } => SetlistItem::Pause { label },
        }
    }
}

impl From<&SetlistItem> for SetlistEntryDto {
    fn from(item: &SetlistItem) -> Self {
        match item {
            SetlistItem::Song { song_id } => SetlistEntryDto::Song {
                song_id: song_id.clone(),
            },
            SetlistItem::Pause { label } => SetlistEntryDto::Pause {
                label: label.clone(),
            },
        }
    }
}

impl From<SetlistDto> for Setlist {
    fn from(dto: SetlistDto) -> Self {
        Setlist {
            id: dto.id,
            title: dto.title,
            items: dto.songs.into_iter().map(SetlistItem::from).collect(),
            version: dto.version,
            updated_at: dto
                .updated_at
                .as_deref()
                .and_then(parse_timestamp_millis)
                .unwrap_or(0),
        }
    }
}

impl From<GigDto> for Gig {
    fn from(dto: GigDto) -> Self {
        Gig {
            id: dto.id,
            title: dto.title,
            date: dto.date,
            venue: dto.venue,
            setlist_id: dto.setlist_id,
        }
    }
}
