//! Session types: the record of one attendance broadcast.
//!
//! A session is one teacher-initiated broadcast for a specific class, room
//! and time window. It tracks:
//! - WHAT is being taken (subject, class, teacher)
//! - WHERE devices must be (the room descriptor)
//! - WHEN it ran (created, started, closed)
//! - HOW tokens are paced (re-issue interval and TTL)

use std::time::Duration;

use echomark_protocol::{ClassId, SessionId, SubjectId, TeacherId, Timestamp};
use echomark_tick::TickConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, RoomLocation};

// ---------------------------------------------------------------------------
// SessionLimits
// ---------------------------------------------------------------------------

/// Bounds and pacing applied to every session a manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Shortest allowed attendance window.
    pub min_window: Duration,
    /// Longest allowed attendance window.
    pub max_window: Duration,
    /// How often a broadcasting session mints a fresh token.
    pub reissue_interval: Duration,
    /// How long each token stays valid. Must be shorter than
    /// `reissue_interval` so at most one token is valid at a time.
    pub token_ttl: Duration,
    /// Largest room radius accepted, in metres.
    pub max_radius_m: f64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            min_window: Duration::from_secs(60),
            max_window: Duration::from_secs(30 * 60),
            reissue_interval: Duration::from_secs(3),
            token_ttl: Duration::from_millis(2_500),
            max_radius_m: 1_000.0,
        }
    }
}

impl SessionLimits {
    /// Checks the limits are self-consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_window.is_zero() || self.min_window > self.max_window {
            return Err(ConfigError::InvalidTiming(format!(
                "window range {:?}..={:?} is empty",
                self.min_window, self.max_window
            )));
        }
        if self.reissue_interval < TickConfig::MIN_INTERVAL {
            return Err(ConfigError::InvalidTiming(format!(
                "re-issue interval {:?} is below the timer minimum {:?}",
                self.reissue_interval,
                TickConfig::MIN_INTERVAL
            )));
        }
        if self.token_ttl.is_zero() || self.token_ttl >= self.reissue_interval {
            return Err(ConfigError::InvalidTiming(format!(
                "token ttl {:?} must be non-zero and shorter than the re-issue interval {:?}",
                self.token_ttl, self.reissue_interval
            )));
        }
        if u32::try_from(self.token_ttl.as_millis()).is_err() {
            return Err(ConfigError::InvalidTiming(format!(
                "token ttl {:?} does not fit the wire format",
                self.token_ttl
            )));
        }
        if !self.max_radius_m.is_finite() || self.max_radius_m <= 0.0 {
            return Err(ConfigError::InvalidTiming(format!(
                "max radius {} m must be positive",
                self.max_radius_m
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What a teacher supplies to open a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub subject: SubjectId,
    pub class_id: ClassId,
    pub teacher_id: TeacherId,
    pub location: RoomLocation,
    /// How long the session broadcasts before closing itself.
    pub window: Duration,
    /// When set, a device can be accepted at most once per session, so one
    /// phone cannot mark several students present.
    pub device_binding: bool,
}

impl SessionConfig {
    /// Validates against `limits`, returning the first problem found.
    pub fn validate(&self, limits: &SessionLimits) -> Result<(), ConfigError> {
        if self.subject.is_blank() {
            return Err(ConfigError::EmptySubject);
        }
        if self.class_id.is_blank() {
            return Err(ConfigError::EmptyClass);
        }
        if self.teacher_id.is_blank() {
            return Err(ConfigError::EmptyTeacher);
        }
        if self.window < limits.min_window || self.window > limits.max_window {
            return Err(ConfigError::WindowOutOfRange {
                actual_secs: self.window.as_secs(),
                min_secs: limits.min_window.as_secs(),
                max_secs: limits.max_window.as_secs(),
            });
        }
        self.location
            .check(limits.max_radius_m)
            .map_err(ConfigError::InvalidLocation)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a session.
///
/// ```text
///   Pending ──(start)──→ Broadcasting ──(stop / window elapsed)──→ Closed
///      │                                                             ↑
///      └────────────────────────(stop)───────────────────────────────┘
/// ```
///
/// `Closed` is terminal: a session never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Pending,
    Broadcasting,
    Closed,
}

impl SessionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Broadcasting)
                | (Self::Pending, Self::Closed)
                | (Self::Broadcasting, Self::Closed)
        )
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One attendance session.
///
/// Pacing values are copied from the limits in force at creation, so a
/// later limits change never alters a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub subject: SubjectId,
    pub class_id: ClassId,
    pub teacher_id: TeacherId,
    pub location: RoomLocation,
    pub window: Duration,
    pub device_binding: bool,
    pub token_ttl: Duration,
    pub reissue_interval: Duration,
    pub state: SessionState,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    /// Set once on close, never changed afterwards.
    pub closed_at: Option<Timestamp>,
}

impl Session {
    /// A fresh `Pending` session.
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        limits: &SessionLimits,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            subject: config.subject,
            class_id: config.class_id,
            teacher_id: config.teacher_id,
            location: config.location,
            window: config.window,
            device_binding: config.device_binding,
            token_ttl: limits.token_ttl,
            reissue_interval: limits.reissue_interval,
            state: SessionState::Pending,
            created_at: now,
            started_at: None,
            closed_at: None,
        }
    }

    pub fn is_broadcasting(&self) -> bool {
        self.state == SessionState::Broadcasting
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// When the window elapses, if the session has started.
    pub fn window_ends_at(&self) -> Option<Timestamp> {
        self.started_at.map(|t| t.saturating_add(self.window))
    }
}
