//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Token rejected (401) or scope missing (403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// File id vanished between lookup and use
    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::FileNotFound { file_id } => BridgeError::NotFound(file_id),
            GoogleDriveError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GoogleDriveError::ApiError {
            status_code: 500,
            message: "Backend Error".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Google Drive API error (status 500): Backend Error"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = GoogleDriveError::AuthenticationFailed("Token expired".to_string());
        let bridge_error: BridgeError = error.into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));

        let missing: BridgeError = GoogleDriveError::FileNotFound {
            file_id: "abc".to_string(),
        }
        .into();
        assert!(missing.is_not_found());
    }
}
