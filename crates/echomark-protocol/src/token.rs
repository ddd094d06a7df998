//! Attendance tokens and the audio frames that carry them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DecodeError, SessionId, Timestamp};

/// Size of a token's wire form in bytes.
///
/// Layout (big-endian):
///
/// ```text
/// 0        8          12           20       24        32
/// | session | sequence | issued_at  | ttl_ms | nonce   |
/// |   u64   |   u32    |    u64     |  u32   | [u8; 8] |
/// ```
pub const TOKEN_WIRE_LEN: usize = 32;

/// A short-lived, single-use proof of presence.
///
/// A token is bound to exactly one session and carries its own validity
/// interval `[issued_at, issued_at + ttl)`. The random `nonce` is what makes
/// a token unforgeable: knowing the session id and the next sequence number
/// is not enough to fabricate one the session will recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// The session that minted this token.
    pub session_id: SessionId,
    /// Strictly increasing within a session, starting at 1.
    pub sequence: u32,
    /// When the token was minted.
    pub issued_at: Timestamp,
    /// How long the token stays valid, in milliseconds.
    pub ttl_ms: u32,
    /// Random bytes chosen at mint time.
    pub nonce: [u8; 8],
}

impl Token {
    /// First instant at which the token is no longer valid.
    pub fn valid_until(&self) -> Timestamp {
        self.issued_at
            .saturating_add(Duration::from_millis(u64::from(self.ttl_ms)))
    }

    /// Returns `true` if `at` falls inside `[issued_at, valid_until)`.
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        at >= self.issued_at && at < self.valid_until()
    }

    /// Serializes the token into its fixed 32-byte wire form.
    pub fn to_bytes(&self) -> [u8; TOKEN_WIRE_LEN] {
        let mut out = [0u8; TOKEN_WIRE_LEN];
        out[0..8].copy_from_slice(&self.session_id.0.to_be_bytes());
        out[8..12].copy_from_slice(&self.sequence.to_be_bytes());
        out[12..20].copy_from_slice(&self.issued_at.as_millis().to_be_bytes());
        out[20..24].copy_from_slice(&self.ttl_ms.to_be_bytes());
        out[24..32].copy_from_slice(&self.nonce);
        out
    }

    /// Parses a token from its wire form.
    ///
    /// # Errors
    /// Returns [`DecodeError::Truncated`] if `bytes` is shorter than
    /// [`TOKEN_WIRE_LEN`]. Any 32 bytes form a structurally valid token;
    /// authenticity is the verifier's concern.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some(bytes) = bytes.get(..TOKEN_WIRE_LEN) else {
            return Err(DecodeError::Truncated {
                needed: TOKEN_WIRE_LEN,
                available: bytes.len(),
            });
        };

        let mut session = [0u8; 8];
        let mut sequence = [0u8; 4];
        let mut issued = [0u8; 8];
        let mut ttl = [0u8; 4];
        let mut nonce = [0u8; 8];
        session.copy_from_slice(&bytes[0..8]);
        sequence.copy_from_slice(&bytes[8..12]);
        issued.copy_from_slice(&bytes[12..20]);
        ttl.copy_from_slice(&bytes[20..24]);
        nonce.copy_from_slice(&bytes[24..32]);

        Ok(Self {
            session_id: SessionId(u64::from_be_bytes(session)),
            sequence: u32::from_be_bytes(sequence),
            issued_at: Timestamp(u64::from_be_bytes(issued)),
            ttl_ms: u32::from_be_bytes(ttl),
            nonce,
        })
    }
}

/// A mono block of PCM samples in `[-1.0, 1.0]`.
///
/// Produced by the encoder for the speaker and handed to the decoder from
/// the microphone, so the same type serves both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Samples per second.
    pub sample_rate: u32,
    /// The PCM samples.
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Wraps raw samples captured at `sample_rate`.
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Playback length of the frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
