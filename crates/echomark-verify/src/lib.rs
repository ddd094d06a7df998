//! Proximity verification of attendance claims.
//!
//! A claim is accepted only if its token is one the session actually issued,
//! was captured and submitted while that token was fresh, has not been used
//! before, and comes from inside the room. See [`ProximityVerifier`] for the
//! exact decision order.

mod claim;
mod verifier;

pub use claim::{AttendanceClaim, Outcome};
pub use verifier::{ProximityVerifier, VerifierConfig};
