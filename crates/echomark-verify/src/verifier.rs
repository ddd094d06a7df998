//! The proximity verifier.
//!
//! Checks run cheapest and most authoritative first, and the first one that
//! fails decides the outcome:
//!
//! | # | Check | Outcome on failure |
//! |---|-------|--------------------|
//! | 1 | session exists and is broadcasting | `RejectedExpired` |
//! | 2 | token decoded and was issued by this session | `RejectedUnknownToken` |
//! |   | (issued, but aged out of the token log) | `RejectedExpired` |
//! | 3 | capture time and arrival inside the validity interval | `RejectedExpired` |
//! | 4 | token, student and bound device unused | `RejectedDuplicate` |
//! | 5 | device inside the room radius | `RejectedLocation` |
//!
//! The geometric check runs last so already-invalid claims never pay for it.

use std::time::Duration;

use echomark_protocol::{Timestamp, Token};
use echomark_session::LiveSession;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AttendanceClaim, Outcome};

enum TokenCheck<'a> {
    /// Byte-for-byte a token this session issued and still remembers.
    Known(&'a Token),
    /// A sequence this session issued but no longer remembers. The log
    /// outlives every token's validity, so it is past `valid_until`.
    Forgotten,
    Unknown,
}

/// Tuning for the verifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Extra time a claim may take to *arrive* after its token expired.
    ///
    /// The capture time must always lie inside the validity interval. With
    /// the default of zero, the arrival time must too.
    pub submission_grace: Duration,
}

/// Decides attendance claims against a session's live state.
#[derive(Debug, Clone, Default)]
pub struct ProximityVerifier {
    config: VerifierConfig,
}

impl ProximityVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Decides `claim` without changing anything.
    ///
    /// `session` is `None` when the claim names a session that does not
    /// exist (or was evicted).
    pub fn evaluate(
        &self,
        claim: &AttendanceClaim,
        session: Option<&LiveSession>,
        now: Timestamp,
    ) -> Outcome {
        let Some(live) = session.filter(|s| s.session().is_broadcasting()) else {
            return Outcome::RejectedExpired;
        };

        let token = match self.check_token(claim, live) {
            TokenCheck::Known(token) => token,
            TokenCheck::Forgotten => return Outcome::RejectedExpired,
            TokenCheck::Unknown => return Outcome::RejectedUnknownToken,
        };

        if !self.is_fresh(token, claim.capture_time, now) {
            return Outcome::RejectedExpired;
        }

        let session = live.session();
        if live.is_redeemed(token.sequence)
            || live.has_attended(&claim.student_id)
            || (session.device_binding && live.device_bound(&claim.device_id))
        {
            return Outcome::RejectedDuplicate;
        }

        if !session.location.contains(&claim.location) {
            return Outcome::RejectedLocation;
        }

        Outcome::Accepted
    }

    /// Decides `claim` and, if accepted, redeems its token in the same
    /// critical section. The caller must hold the session's lock for the
    /// whole call.
    pub fn verify(
        &self,
        claim: &AttendanceClaim,
        session: Option<&mut LiveSession>,
        now: Timestamp,
    ) -> Outcome {
        let outcome = self.evaluate(claim, session.as_deref(), now);
        if let (Outcome::Accepted, Some(live), Some(token)) = (outcome, session, claim.token) {
            Self::redeem(claim, &token, live);
        }
        outcome
    }

    /// Marks an accepted claim's token, student and device as used.
    pub fn commit(claim: &AttendanceClaim, live: &mut LiveSession) {
        if let Some(token) = claim.token {
            Self::redeem(claim, &token, live);
        }
    }

    fn redeem(claim: &AttendanceClaim, token: &Token, live: &mut LiveSession) {
        live.redeem(
            token.sequence,
            claim.student_id.clone(),
            claim.device_id.clone(),
        );
        info!(
            session_id = %claim.session_id,
            sequence = token.sequence,
            student = %claim.student_id,
            "attendance accepted"
        );
    }

    /// Matches the claim's token against what this session issued.
    fn check_token<'a>(&self, claim: &'a AttendanceClaim, live: &LiveSession) -> TokenCheck<'a> {
        let Some(token) = claim.token.as_ref() else {
            return TokenCheck::Unknown;
        };
        if token.session_id != claim.session_id || token.session_id != live.id() {
            debug!(session_id = %claim.session_id, token_session = %token.session_id, "token for another session");
            return TokenCheck::Unknown;
        }
        match live.issued_token(token.sequence) {
            Some(issued) if issued == token => TokenCheck::Known(token),
            Some(_) => {
                debug!(session_id = %claim.session_id, sequence = token.sequence, "forged token");
                TokenCheck::Unknown
            }
            None if live.was_issued(token.sequence) => {
                debug!(session_id = %claim.session_id, sequence = token.sequence, "token aged out of the log");
                TokenCheck::Forgotten
            }
            None => {
                debug!(session_id = %claim.session_id, sequence = token.sequence, "sequence not issued");
                TokenCheck::Unknown
            }
        }
    }

    fn is_fresh(&self, token: &Token, capture_time: Timestamp, now: Timestamp) -> bool {
        let deadline = token.valid_until().saturating_add(self.config.submission_grace);
        token.is_valid_at(capture_time) && now >= token.issued_at && now < deadline
    }
}
