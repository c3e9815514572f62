//! Error types for the content API provider

use core_library::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentApiError {
    /// Non-success status from the API
    #[error("Content API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Invalid connector configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    BridgeError(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, ContentApiError>;

impl From<ContentApiError> for RemoteError {
    fn from(error: ContentApiError) -> Self {
        match error {
            ContentApiError::ApiError {
                status_code,
                message,
            } => RemoteError::Server {
                status: status_code,
                message,
            },
            ContentApiError::ParseError(msg) => RemoteError::Parse(msg),
            ContentApiError::InvalidConfig(msg) => RemoteError::Transport(msg),
            ContentApiError::BridgeError(err) => RemoteError::from(err),
        }
    }
}
