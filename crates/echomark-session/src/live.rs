//! Mutable state of a session: issued tokens and the redemption book.
//!
//! A [`LiveSession`] lives behind a per-session mutex. Everything that must
//! be atomic for one session (minting a token, closing, redeeming) is a
//! `&mut self` method here, so holding the lock is enough.

use std::collections::{HashMap, HashSet, VecDeque};

use echomark_protocol::{DeviceId, SessionId, StudentId, Timestamp, Token};
use rand::Rng;
use tracing::{debug, info};

use crate::{Session, SessionError, SessionState};

/// How many recently issued tokens a session remembers.
///
/// With a 3 s cadence this covers the last 48 s of broadcast, far longer
/// than any token stays valid.
pub const TOKEN_LOG_LEN: usize = 16;

/// A session plus the state that changes while it broadcasts.
#[derive(Debug, Clone)]
pub struct LiveSession {
    session: Session,
    next_sequence: u32,
    issued: VecDeque<Token>,
    /// Redeemed sequence → who redeemed it.
    redeemed: HashMap<u32, (StudentId, DeviceId)>,
    attendees: HashSet<StudentId>,
    bound_devices: HashSet<DeviceId>,
}

impl LiveSession {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            next_sequence: 1,
            issued: VecDeque::with_capacity(TOKEN_LOG_LEN),
            redeemed: HashMap::new(),
            attendees: HashSet::new(),
            bound_devices: HashSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    // -- lifecycle ----------------------------------------------------------

    /// `Pending → Broadcasting`.
    pub fn start(&mut self, now: Timestamp) -> Result<(), SessionError> {
        self.transition(SessionState::Broadcasting)?;
        self.session.started_at = Some(now);
        info!(session_id = %self.session.id, "session broadcasting");
        Ok(())
    }

    /// Closes the session. Returns `false` if it was already closed.
    pub fn close(&mut self, now: Timestamp) -> bool {
        if self.session.is_closed() {
            return false;
        }
        self.session.state = SessionState::Closed;
        self.session.closed_at = Some(now);
        info!(
            session_id = %self.session.id,
            tokens = self.next_sequence - 1,
            attendees = self.attendees.len(),
            "session closed"
        );
        true
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        let from = self.session.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                id: self.session.id,
                from,
                to,
            });
        }
        self.session.state = to;
        Ok(())
    }

    // -- tokens -------------------------------------------------------------

    /// Mints the next token. Only a broadcasting session issues tokens.
    pub fn issue_next_token(&mut self, now: Timestamp) -> Result<Token, SessionError> {
        if !self.session.is_broadcasting() {
            return Err(SessionError::NotBroadcasting(self.session.id));
        }

        let token = Token {
            session_id: self.session.id,
            sequence: self.next_sequence,
            issued_at: now,
            ttl_ms: u32::try_from(self.session.token_ttl.as_millis()).unwrap_or(u32::MAX),
            nonce: rand::rng().random(),
        };
        self.next_sequence = self.next_sequence.saturating_add(1);

        if self.issued.len() == TOKEN_LOG_LEN {
            self.issued.pop_front();
        }
        self.issued.push_back(token);

        debug!(
            session_id = %token.session_id,
            sequence = token.sequence,
            valid_until = %token.valid_until(),
            "token issued"
        );
        Ok(token)
    }

    /// The token this session issued with `sequence`, if still remembered.
    pub fn issued_token(&self, sequence: u32) -> Option<&Token> {
        self.issued.iter().rev().find(|t| t.sequence == sequence)
    }

    /// Whether `sequence` was ever minted here, remembered or not.
    pub fn was_issued(&self, sequence: u32) -> bool {
        (1..self.next_sequence).contains(&sequence)
    }

    /// The most recently issued token.
    pub fn current_token(&self) -> Option<&Token> {
        self.issued.back()
    }

    /// Number of tokens minted so far.
    pub fn tokens_issued(&self) -> u32 {
        self.next_sequence - 1
    }

    // -- redemption book ----------------------------------------------------

    pub fn is_redeemed(&self, sequence: u32) -> bool {
        self.redeemed.contains_key(&sequence)
    }

    /// Who redeemed `sequence`, if anyone.
    pub fn redeemed_by(&self, sequence: u32) -> Option<(&StudentId, &DeviceId)> {
        self.redeemed.get(&sequence).map(|(s, d)| (s, d))
    }

    pub fn has_attended(&self, student: &StudentId) -> bool {
        self.attendees.contains(student)
    }

    pub fn device_bound(&self, device: &DeviceId) -> bool {
        self.bound_devices.contains(device)
    }

    pub fn attendee_count(&self) -> usize {
        self.attendees.len()
    }

    /// Records an accepted claim. The caller has already checked that the
    /// sequence, student and device are all unused.
    pub fn redeem(&mut self, sequence: u32, student: StudentId, device: DeviceId) {
        self.attendees.insert(student.clone());
        if self.session.device_binding {
            self.bound_devices.insert(device.clone());
        }
        self.redeemed.insert(sequence, (student, device));
    }
}
