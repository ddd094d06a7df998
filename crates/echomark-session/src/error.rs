//! Error types for the session layer.

use echomark_protocol::SessionId;

use crate::SessionState;

/// A session configuration that was rejected at creation.
///
/// Bad configs are never silently corrected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("subject must not be empty")]
    EmptySubject,

    #[error("class id must not be empty")]
    EmptyClass,

    #[error("teacher id must not be empty")]
    EmptyTeacher,

    /// The attendance window is outside the allowed range.
    #[error("window of {actual_secs}s outside allowed range {min_secs}s..={max_secs}s")]
    WindowOutOfRange {
        actual_secs: u64,
        min_secs: u64,
        max_secs: u64,
    },

    /// The room descriptor is malformed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// Re-issue interval and token TTL do not fit together.
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// No session with this id is registered (never created, or evicted).
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The requested state change is not allowed. The session is unchanged.
    #[error("session {id} cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        id: SessionId,
        from: SessionState,
        to: SessionState,
    },

    /// Tokens are only minted while the session is broadcasting.
    #[error("session {0} is not broadcasting")]
    NotBroadcasting(SessionId),

    /// Attendance cannot be submitted before the session starts.
    #[error("session {0} has not started")]
    SessionNotActive(SessionId),
}
