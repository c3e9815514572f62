use core_library::{LibraryError, RemoteError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    /// The boot sequence runs once per application load.
    #[error("Offline data initializer already ran")]
    AlreadyInitialized,

    /// A user edit needs the remote source and there is no network.
    #[error("Network offline: {0}")]
    Offline(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl CoreError {
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            CoreError::Offline(_)
                | CoreError::Remote(RemoteError::Offline(_))
                | CoreError::Sync(core_sync::SyncError::Offline(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
