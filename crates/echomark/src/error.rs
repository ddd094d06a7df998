//! Unified error type for EchoMark.

use echomark_ledger::PersistenceError;
use echomark_protocol::{ProtocolError, SessionId};
use echomark_session::{ConfigError, SessionError};

/// Top-level error that wraps all crate-specific errors.
///
/// Rejected claims are not errors: they come back as an
/// [`Outcome`](echomark_verify::Outcome). An `EchomarkError` from
/// `submit_attendance` means the outcome is unknown.
#[derive(Debug, thiserror::Error)]
pub enum EchomarkError {
    /// Codec setup failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Orchestrator limits are inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lifecycle errors: bad session config, unknown session, illegal
    /// transition, submission before start.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The ledger could not record the result.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The session's audio stream was already handed out.
    #[error("token audio stream for session {0} is unavailable")]
    StreamUnavailable(SessionId),
}
