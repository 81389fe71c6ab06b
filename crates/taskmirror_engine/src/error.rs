//! Error types for the sync engine.

use crate::state::CommandOutcome;
use std::time::Duration;
use taskmirror_protocol::DecodeError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The server rejected the credential. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server asked the client to slow down.
    #[error("rate limited by server (retry after {retry_after:?})")]
    RateLimited {
        /// Server-suggested wait, if any.
        retry_after: Option<Duration>,
    },

    /// The server invalidated the cursor; restart from the wildcard.
    #[error("sync token reset required")]
    TokenReset,

    /// Transport failures exhausted the retry budget.
    #[error("request failed after {attempts} attempt(s): {message}")]
    Request {
        /// Attempts made.
        attempts: u32,
        /// Last transport failure.
        message: String,
    },

    /// Malformed or semantically invalid response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A response record could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The server answered with an unexpected HTTP status.
    #[error("server error (status {status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// One or more commands in a batch were rejected.
    ///
    /// Effects of the commands that succeeded are already merged.
    #[error("{} command(s) failed: {}", .0.failed.len(), .0.failure_summary())]
    CommandFailure(Box<CommandOutcome>),

    /// The caller supplied an unusable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RateLimited { .. } | SyncError::Request { .. } => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the credential must be fixed before retrying.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }

    /// Returns the command outcome of a partial failure.
    pub fn command_outcome(&self) -> Option<&CommandOutcome> {
        match self {
            SyncError::CommandFailure(outcome) => Some(outcome),
            _ => None,
        }
    }
}
