//! In-memory index shared by every ledger backend.
//!
//! Statistics are computed by scanning entries on demand; nothing derived
//! is stored, so there is nothing to drift.

use std::collections::HashMap;

use echomark_protocol::{SessionId, StudentId, SubjectId};
use echomark_session::Session;
use echomark_verify::Outcome;

use crate::{LedgerEntry, SessionSummary, Statistics};

#[derive(Debug, Default)]
pub(crate) struct LedgerIndex {
    sessions: HashMap<SessionId, Session>,
    /// Per-session entries in submission order.
    entries: HashMap<SessionId, Vec<LedgerEntry>>,
    len: usize,
}

impl LedgerIndex {
    pub(crate) fn record_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub(crate) fn append(&mut self, entry: LedgerEntry) {
        self.entries.entry(entry.session_id).or_default().push(entry);
        self.len += 1;
    }

    pub(crate) fn query(&self, session_id: SessionId) -> Vec<LedgerEntry> {
        self.entries.get(&session_id).cloned().unwrap_or_default()
    }

    pub(crate) fn session(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.get(&session_id).cloned()
    }

    pub(crate) fn statistics(&self, student: &StudentId, subject: &SubjectId) -> Statistics {
        let mut present = 0;
        let mut total = 0;
        for session in self.sessions.values() {
            if &session.subject != subject || session.started_at.is_none() {
                continue;
            }
            total += 1;
            let attended = self.entries.get(&session.id).is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| e.outcome == Outcome::Accepted && &e.student_id == student)
            });
            if attended {
                present += 1;
            }
        }
        Statistics::new(student.clone(), subject.clone(), present, total)
    }

    pub(crate) fn summary(&self, session_id: SessionId) -> SessionSummary {
        self.entries
            .get(&session_id)
            .map(|entries| entries.iter().map(|e| e.outcome).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
