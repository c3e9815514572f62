use core_library::{LibraryError, RemoteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified reason a sync stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFailureKind {
    Offline,
    Timeout,
    ServerError,
    ParseError,
    StorageUnavailable,
    QuotaExceeded,
}

impl SyncFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFailureKind::Offline => "offline",
            SyncFailureKind::Timeout => "timeout",
            SyncFailureKind::ServerError => "server_error",
            SyncFailureKind::ParseError => "parse_error",
            SyncFailureKind::StorageUnavailable => "storage_unavailable",
            SyncFailureKind::QuotaExceeded => "quota_exceeded",
        }
    }

    /// Whether retrying later without user action can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncFailureKind::Offline | SyncFailureKind::Timeout | SyncFailureKind::ServerError
        )
    }
}

impl fmt::Display for SyncFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a run at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Songs,
    Setlist,
    Gigs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: SyncFailureKind,
    pub stage: SyncStage,
    pub message: String,
}

impl SyncFailure {
    pub fn new(kind: SyncFailureKind, stage: SyncStage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn from_remote(stage: SyncStage, err: &RemoteError) -> Self {
        let kind = match err {
            RemoteError::Offline(_) | RemoteError::Transport(_) => SyncFailureKind::Offline,
            RemoteError::Timeout(_) => SyncFailureKind::Timeout,
            RemoteError::Server { .. } | RemoteError::NotFound { .. } => {
                SyncFailureKind::ServerError
            }
            RemoteError::Parse(_) => SyncFailureKind::ParseError,
        };
        Self::new(kind, stage, err.to_string())
    }

    pub fn from_storage(stage: SyncStage, err: &LibraryError) -> Self {
        let kind = match err {
            LibraryError::QuotaExceeded(_) => SyncFailureKind::QuotaExceeded,
            // Fetched data that references songs found nowhere is malformed.
            LibraryError::MissingSongs { .. } | LibraryError::InvalidInput { .. } => {
                SyncFailureKind::ParseError
            }
            _ => SyncFailureKind::StorageUnavailable,
        };
        Self::new(kind, stage, err.to_string())
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {:?} stage: {}", self.kind, self.stage, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network offline: {0}")]
    Offline(String),

    #[error("Sync timed out: {0}")]
    Timeout(String),

    #[error("Remote source failed: {0}")]
    ServerError(String),

    #[error("Malformed remote data: {0}")]
    ParseError(String),

    #[error("Local storage failed ({kind}): {message}")]
    Storage {
        kind: SyncFailureKind,
        message: String,
    },

    /// Songs were committed but a later stage failed.
    #[error("Sync partially completed: {0}")]
    Partial(SyncFailure),

    /// The sync task ended without producing a report.
    #[error("Sync aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub fn kind(&self) -> Option<SyncFailureKind> {
        match self {
            SyncError::Offline(_) => Some(SyncFailureKind::Offline),
            SyncError::Timeout(_) => Some(SyncFailureKind::Timeout),
            SyncError::ServerError(_) => Some(SyncFailureKind::ServerError),
            SyncError::ParseError(_) => Some(SyncFailureKind::ParseError),
            SyncError::Storage { kind, .. } => Some(*kind),
            SyncError::Partial(failure) => Some(failure.kind),
            SyncError::Aborted(_) => None,
        }
    }
}

impl From<SyncFailure> for SyncError {
    fn from(failure: SyncFailure) -> Self {
        match failure.kind {
            SyncFailureKind::Offline => SyncError::Offline(failure.message),
            SyncFailureKind::Timeout => SyncError::Timeout(failure.message),
            SyncFailureKind::ServerError => SyncError::ServerError(failure.message),
            SyncFailureKind::ParseError => SyncError::ParseError(failure.message),
            kind @ (SyncFailureKind::StorageUnavailable | SyncFailureKind::QuotaExceeded) => {
                SyncError::Storage {
                    kind,
                    message: failure.message,
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_are_classified() {
        let cases = [
            (RemoteError::Offline("x".into()), SyncFailureKind::Offline),
            (RemoteError::Timeout("x".into()), SyncFailureKind::Timeout),
            (
                RemoteError::Server {
                    status: 500,
                    message: "x".into(),
                },
                SyncFailureKind::ServerError,
            ),
            (RemoteError::Parse("x".into()), SyncFailureKind::ParseError),
        ];
        for (err, kind) in cases {
            assert_eq!(SyncFailure::from_remote(SyncStage::Songs, &err).kind, kind);
        }
    }

    #[test]
    fn test_storage_errors_are_classified() {
        let quota = LibraryError::QuotaExceeded("full".into());
        assert_eq!(
            SyncFailure::from_storage(SyncStage::Songs, &quota).kind,
            SyncFailureKind::QuotaExceeded
        );
        let missing = LibraryError::MissingSongs {
            setlist_id: "s".into(),
            missing: vec!["x".into()],
        };
        assert_eq!(
            SyncFailure::from_storage(SyncStage::Setlist, &missing).kind,
            SyncFailureKind::ParseError
        );
    }

    #[test]
    fn test_failure_converts_to_error() {
        let failure = SyncFailure::new(SyncFailureKind::Timeout, SyncStage::Setlist, "8s");
        let err = SyncError::from(failure);
        assert_eq!(err, SyncError::Timeout("8s".into()));
        assert_eq!(err.kind(), Some(SyncFailureKind::Timeout));
        assert!(SyncFailureKind::Timeout.is_retryable());
        assert!(!SyncFailureKind::QuotaExceeded.is_retryable());
    }
}
