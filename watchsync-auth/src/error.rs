//! Authentication error types.

use thiserror::Error;

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised while obtaining bearer tokens or federated credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials, configuration or request. Retrying will not help.
    #[error("client error: {0}")]
    Client(String),

    /// Issuer or federation service unavailable. Retry later.
    #[error("server error: {0}")]
    Server(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// True when the failure needs operator input rather than a retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, AuthError::Client(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.is_client_error() => AuthError::Client(e.to_string()),
            _ => AuthError::Server(e.to_string()),
        }
    }
}
