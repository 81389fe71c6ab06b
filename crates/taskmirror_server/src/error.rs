//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Request-level errors. Per-command failures are reported in `sync_status`.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected bearer token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Too many commands in one request.
    #[error("too many commands: {count} > {max}")]
    TooManyCommands {
        /// Commands sent.
        count: usize,
        /// Configured limit.
        max: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::NotAuthorized(_)
                | ServerError::TooManyCommands { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Returns the HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::NotAuthorized(_) => 401,
            ServerError::InvalidRequest(_) | ServerError::TooManyCommands { .. } => 400,
            ServerError::Internal(_) => 500,
        }
    }
}
