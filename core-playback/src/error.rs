//! # Playback Error Types

use core_library::LibraryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a song's audio could not be made playable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioUnavailableReason {
    /// Not cached and no network path.
    Offline,
    /// The song has no audio URL.
    NoSource,
    Timeout,
    /// Non-success status from the audio host.
    ServerError,
    /// Fewer or more bytes than the declared length.
    Truncated,
    EmptyBody,
    Transport,
    /// The fetch task stopped before producing a result.
    Interrupted,
}

impl AudioUnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioUnavailableReason::Offline => "offline",
            AudioUnavailableReason::NoSource => "no_source",
            AudioUnavailableReason::Timeout => "timeout",
            AudioUnavailableReason::ServerError => "server_error",
            AudioUnavailableReason::Truncated => "truncated",
            AudioUnavailableReason::EmptyBody => "empty_body",
            AudioUnavailableReason::Transport => "transport",
            AudioUnavailableReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for AudioUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the audio cache.
///
/// Cloneable so that coalesced callers can share one fetch result.
#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    /// Scoped to one song; the player skips to the next track.
    #[error("Audio unavailable for song {song_id}: {reason}")]
    AudioUnavailable {
        song_id: String,
        reason: AudioUnavailableReason,
    },

    /// Only returned by cache maintenance calls. Playback requests degrade
    /// to uncached handles instead.
    #[error("Audio cache storage error: {0}")]
    Storage(#[source] Arc<LibraryError>),
}

impl PlaybackError {
    pub fn unavailable(song_id: impl Into<String>, reason: AudioUnavailableReason) -> Self {
        PlaybackError::AudioUnavailable {
            song_id: song_id.into(),
            reason,
        }
    }

    pub fn reason(&self) -> Option<AudioUnavailableReason> {
        match self {
            PlaybackError::AudioUnavailable { reason, .. } => Some(*reason),
            PlaybackError::Storage(_) => None,
        }
    }
}

impl From<LibraryError> for PlaybackError {
    fn from(err: LibraryError) -> Self {
        PlaybackError::Storage(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
