//! Contract of the authoritative content source
//!
//! The Local Store only ever holds replicas of what this source returns.
//! Implementations live in provider crates; the sync engine depends only on
//! the read half.

use crate::models::{Gig, Setlist, SetlistItem, Song};
use async_trait::async_trait;
use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote source unreachable: {0}")]
    Offline(String),

    #[error("Remote request timed out: {0}")]
    Timeout(String),

    #[error("Remote source returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{entity_type} {id} does not exist on the remote source")]
    NotFound { entity_type: String, id: String },
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Offline(_) | RemoteError::Timeout(_) => true,
            RemoteError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<BridgeError> for RemoteError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Offline(msg) => RemoteError::Offline(msg),
            BridgeError::Timeout(msg) => RemoteError::Timeout(msg),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Read/write contract of the remote content API.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Full song catalog.
    async fn get_all_songs(&self) -> RemoteResult<Vec<Song>>;

    /// Setlist with the given title, `None` when the remote has none.
    async fn get_setlist(&self, title: &str) -> RemoteResult<Option<Setlist>>;

    async fn get_gig(&self, id: &str) -> RemoteResult<Option<Gig>>;

    async fn get_gigs(&self) -> RemoteResult<Vec<Gig>>;

    /// Replace the ordered items of a setlist. Returns the setlist as stored
    /// remotely after the write.
    async fn update_setlist_songs(
        &self,
        setlist_id: &str,
        items: &[SetlistItem],
    ) -> RemoteResult<Setlist>;

    async fn modify_lyrics(&self, song_id: &str, lyrics: &str) -> RemoteResult<Song>;
}
