//! Ledger records and the aggregates derived from them.

use echomark_protocol::{DeviceId, SessionId, StudentId, SubjectId, Timestamp};
use echomark_session::ClaimedLocation;
use echomark_verify::{AttendanceClaim, Outcome};
use serde::{Deserialize, Serialize};

/// The final outcome of one claim. Never changed once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub device_id: DeviceId,
    /// Sequence of the presented token; `None` if the audio did not decode.
    pub sequence: Option<u32>,
    pub location: ClaimedLocation,
    pub capture_time: Timestamp,
    pub outcome: Outcome,
    pub decided_at: Timestamp,
}

impl LedgerEntry {
    /// Records `claim`'s outcome as decided at `decided_at`.
    pub fn from_claim(claim: &AttendanceClaim, outcome: Outcome, decided_at: Timestamp) -> Self {
        Self {
            session_id: claim.session_id,
            student_id: claim.student_id.clone(),
            device_id: claim.device_id.clone(),
            sequence: claim.token.map(|t| t.sequence),
            location: claim.location.clone(),
            capture_time: claim.capture_time,
            outcome,
            decided_at,
        }
    }
}

/// A student's attendance record for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub student_id: StudentId,
    pub subject: SubjectId,
    /// Sessions of the subject the student was accepted in.
    pub present: u32,
    /// Sessions of the subject that started.
    pub total: u32,
    /// `present * 100 / total`, or `0.0` when no session has started.
    pub percentage: f64,
}

impl Statistics {
    pub fn new(student_id: StudentId, subject: SubjectId, present: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            f64::from(present) * 100.0 / f64::from(total)
        };
        Self {
            student_id,
            subject,
            present,
            total,
            percentage,
        }
    }
}

/// Per-outcome tally for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub accepted: u32,
    pub rejected_expired: u32,
    pub rejected_location: u32,
    pub rejected_duplicate: u32,
    pub rejected_unknown_token: u32,
}

impl SessionSummary {
    pub fn record(&mut self, outcome: Outcome) {
        *self.slot(outcome) += 1;
    }

    pub fn count(&self, outcome: Outcome) -> u32 {
        match outcome {
            Outcome::Accepted => self.accepted,
            Outcome::RejectedExpired => self.rejected_expired,
            Outcome::RejectedLocation => self.rejected_location,
            Outcome::RejectedDuplicate => self.rejected_duplicate,
            Outcome::RejectedUnknownToken => self.rejected_unknown_token,
        }
    }

    /// Claims decided, whatever the outcome.
    pub fn total(&self) -> u32 {
        Outcome::ALL.iter().map(|o| self.count(*o)).sum()
    }

    fn slot(&mut self, outcome: Outcome) -> &mut u32 {
        match outcome {
            Outcome::Accepted => &mut self.accepted,
            Outcome::RejectedExpired => &mut self.rejected_expired,
            Outcome::RejectedLocation => &mut self.rejected_location,
            Outcome::RejectedDuplicate => &mut self.rejected_duplicate,
            Outcome::RejectedUnknownToken => &mut self.rejected_unknown_token,
        }
    }
}

impl FromIterator<Outcome> for SessionSummary {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut summary = Self::default();
        for outcome in iter {
            summary.record(outcome);
        }
        summary
    }
}
