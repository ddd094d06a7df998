//! The `AttendanceLedger` trait: the storage seam of EchoMark.

use std::future::Future;

use echomark_protocol::{SessionId, StudentId, SubjectId};
use echomark_session::Session;

use crate::{LedgerEntry, PersistenceError, SessionSummary, Statistics};

/// Append-only store of claim outcomes and the session records they refer
/// to.
///
/// Appending is the only way entries change. Entries of one session come
/// back from [`query`](Self::query) in the order they were appended.
///
/// Methods return `Send` futures so the orchestrator can call them from
/// spawned tasks.
pub trait AttendanceLedger: Send + Sync + 'static {
    /// Inserts or replaces the record of a session.
    fn record_session(
        &self,
        session: Session,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Appends one decided claim.
    fn append(&self, entry: LedgerEntry)
    -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// All entries for a session, oldest first.
    fn query(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, PersistenceError>> + Send;

    /// Attendance of one student across the started sessions of a subject.
    fn statistics(
        &self,
        student: &StudentId,
        subject: &SubjectId,
    ) -> impl Future<Output = Result<Statistics, PersistenceError>> + Send;

    /// Outcome tally for one session.
    fn summary(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<SessionSummary, PersistenceError>> + Send;
}
