//! Agent error types.

use thiserror::Error;
use watchsync_auth::AuthError;

/// Result type for agent operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing watch state.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("remote queue error: {0}")]
    Queue(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("event delivery failed: {0}")]
    Delivery(String),

    #[error("malformed message: {0}")]
    Decode(String),

    #[error("device registration failed: {0}")]
    Registration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("agent is stopping")]
    Stopped,
}

impl SyncError {
    /// True when retrying cannot succeed without operator action.
    pub fn is_permanent(&self) -> bool {
        match self {
            SyncError::Auth(e) => e.is_permanent(),
            SyncError::Registration(_) | SyncError::Config(_) => true,
            SyncError::Http(e) => e.status().is_some_and(|s| s.is_client_error()),
            _ => false,
        }
    }

    /// True when the operation may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        !self.is_permanent()
    }
}
