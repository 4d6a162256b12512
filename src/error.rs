use crate::database::DatabaseError;
use sqlx::Error as SqlxError;
use std::time::Duration;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Attribution store errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Remote platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Failures reported by the remote chat platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Rate limiting, 5xx responses or network failures
    #[error("Transient platform failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Missing scope for the requested resource
    #[error("Missing permission: {0}")]
    Permission(String),

    /// Guild unknown or currently in an outage
    #[error("Guild unavailable: {0}")]
    Unavailable(String),

    /// The bot token was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed payload
    #[error("Failed to decode platform payload: {0}")]
    Decode(String),

    /// Gateway websocket failure
    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl PlatformError {
    pub fn transient(message: impl Into<String>) -> Self {
        PlatformError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Check if retrying later could succeed without any change on our side
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient { .. } | PlatformError::Gateway(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::Decode(err.to_string())
        } else {
            PlatformError::transient(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PlatformError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        PlatformError::Gateway(err.to_string())
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::Database(db_err) => {
                // Unique violation
                if db_err.code().as_deref() == Some("23505") {
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}
