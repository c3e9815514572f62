use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The durable store cannot be reached at all. Callers fall back to memory.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Setlist {setlist_id} references songs that are not stored: {missing:?}")]
    MissingSongs {
        setlist_id: String,
        missing: Vec<String>,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LibraryError {
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, LibraryError::StorageUnavailable(_))
    }

    /// Failures of the storage medium itself, as opposed to rejected data.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            LibraryError::StorageUnavailable(_) | LibraryError::QuotaExceeded(_)
        )
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        LibraryError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

// Primary result codes, see https://www.sqlite.org/rescode.html
const SQLITE_IOERR: i32 = 10;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

impl From<sqlx::Error> for LibraryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                LibraryError::StorageUnavailable(err.to_string())
            }
            sqlx::Error::Io(_) => LibraryError::StorageUnavailable(err.to_string()),
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(SQLITE_FULL) => LibraryError::QuotaExceeded(db.message().to_string()),
                    Some(SQLITE_IOERR) | Some(SQLITE_CANTOPEN) => {
                        LibraryError::StorageUnavailable(db.message().to_string())
                    }
                    _ => LibraryError::Database(err),
                }
            }
            _ => LibraryError::Database(err),
        }
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_storage_unavailable() {
        let err = LibraryError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_storage_unavailable());
        assert!(err.is_storage_failure());

        let err = LibraryError::from(sqlx::Error::PoolClosed);
        assert!(err.is_storage_unavailable());
    }

    #[test]
    fn test_row_not_found_stays_database_error() {
        let err = LibraryError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, LibraryError::Database(_)));
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn test_quota_is_storage_failure_but_not_unavailable() {
        let err = LibraryError::QuotaExceeded("full".to_string());
        assert!(err.is_storage_failure());
        assert!(!err.is_storage_unavailable());
    }
}
