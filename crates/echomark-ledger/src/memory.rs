//! In-process ledger. Lost when the process exits.

use echomark_protocol::{SessionId, StudentId, SubjectId};
use echomark_session::Session;
use tokio::sync::RwLock;
use tracing::trace;

use crate::index::LedgerIndex;
use crate::{AttendanceLedger, LedgerEntry, PersistenceError, SessionSummary, Statistics};

/// A ledger held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    index: RwLock<LedgerIndex>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all sessions.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The stored record of a session, if any.
    pub async fn session(&self, session_id: SessionId) -> Option<Session> {
        self.index.read().await.session(session_id)
    }
}

impl AttendanceLedger for MemoryLedger {
    async fn record_session(&self, session: Session) -> Result<(), PersistenceError> {
        trace!(session_id = %session.id, state = ?session.state, "session recorded");
        self.index.write().await.record_session(session);
        Ok(())
    }

    async fn append(&self, entry: LedgerEntry) -> Result<(), PersistenceError> {
        self.index.write().await.append(entry);
        Ok(())
    }

    async fn query(&self, session_id: SessionId) -> Result<Vec<LedgerEntry>, PersistenceError> {
        Ok(self.index.read().await.query(session_id))
    }

    async fn statistics(
        &self,
        student: &StudentId,
        subject: &SubjectId,
    ) -> Result<Statistics, PersistenceError> {
        Ok(self.index.read().await.statistics(student, subject))
    }

    async fn summary(&self, session_id: SessionId) -> Result<SessionSummary, PersistenceError> {
        Ok(self.index.read().await.summary(session_id))
    }
}
