//! Error types for the session layer

use std::time::Duration;

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced to the application shell
#[derive(Debug, Error)]
pub enum SessionError {
    /// Identity provider rejected or failed a request
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Global sign-out failed (local state has already been cleared)
    #[error("Sign-out failed: {0}")]
    SignOut(AuthError),

    /// Too many attempts for a throttled operation
    #[error("Too many attempts - try again in {} seconds", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No async runtime to host the monitor's tasks
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

/// Identity provider errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("No active session")]
    NoSession,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Durable key-value storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted store: {0}")]
    Corrupted(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Remote audit sink errors
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("Audit sink rejected event: {0}")]
    Rejected(String),

    #[error("Audit sink unreachable: {0}")]
    Unreachable(String),
}
