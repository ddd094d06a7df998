//! Attendance claims and their outcomes.

use std::fmt;

use echomark_protocol::{DeviceId, SessionId, StudentId, Timestamp, Token};
use echomark_session::ClaimedLocation;
use serde::{Deserialize, Serialize};

/// A student device's assertion that it heard a token at a place and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceClaim {
    pub session_id: SessionId,
    /// The decoded token, or `None` when the captured audio did not decode.
    pub token: Option<Token>,
    pub student_id: StudentId,
    /// Pre-hashed by the client; opaque here.
    pub device_id: DeviceId,
    pub location: ClaimedLocation,
    /// When the device says it captured the audio.
    pub capture_time: Timestamp,
}

/// The verifier's decision on a claim.
///
/// Rejections are ordinary results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Accepted,
    /// The session is gone or closed, or the token was not valid at the time.
    RejectedExpired,
    /// The device was outside the room.
    RejectedLocation,
    /// The token, student or bound device was already used in this session.
    RejectedDuplicate,
    /// The audio did not decode, or the token was not issued by this session.
    RejectedUnknownToken,
}

impl Outcome {
    /// Every outcome, in declaration order.
    pub const ALL: [Outcome; 5] = [
        Outcome::Accepted,
        Outcome::RejectedExpired,
        Outcome::RejectedLocation,
        Outcome::RejectedDuplicate,
        Outcome::RejectedUnknownToken,
    ];

    pub fn is_accepted(self) -> bool {
        self == Outcome::Accepted
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Accepted => "accepted",
            Outcome::RejectedExpired => "rejected: expired",
            Outcome::RejectedLocation => "rejected: location",
            Outcome::RejectedDuplicate => "rejected: duplicate",
            Outcome::RejectedUnknownToken => "rejected: unknown token",
        })
    }
}
