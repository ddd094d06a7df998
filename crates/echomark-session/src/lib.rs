//! Attendance session management for EchoMark.
//!
//! This crate owns the lifecycle of a broadcast session:
//!
//! 1. **Creation**: validating a teacher's [`SessionConfig`] against
//!    [`SessionLimits`] ([`SessionManager::create_session`])
//! 2. **Broadcasting**: minting a fresh [`Token`](echomark_protocol::Token)
//!    at a fixed cadence ([`LiveSession::issue_next_token`])
//! 3. **Redemption book**: remembering which tokens, students and devices
//!    have already been accepted ([`LiveSession`])
//! 4. **Closing**: a terminal state that stops issuance for good
//!
//! # How it fits in the stack
//!
//! ```text
//! Orchestrator (above)  ← drives start/stop and the broadcast task
//!     ↕
//! Verifier (beside)     ← reads and updates the redemption book
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides SessionId, Token, Timestamp
//! ```

mod clock;
mod error;
mod live;
mod location;
mod manager;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, SessionError};
pub use live::{LiveSession, TOKEN_LOG_LEN};
pub use location::{Anchor, ClaimedLocation, EARTH_RADIUS_M, GeoPoint, RoomLocation};
pub use manager::{SessionCell, SessionManager};
pub use session::{Session, SessionConfig, SessionLimits, SessionState};
