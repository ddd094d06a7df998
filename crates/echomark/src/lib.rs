//! # EchoMark
//!
//! Proxy-resistant attendance over a near-ultrasonic token broadcast.
//!
//! A teacher device broadcasts short-lived tokens as inaudible FSK audio.
//! Student devices capture the audio and submit it with their location;
//! the [`SessionOrchestrator`] decodes it, checks freshness, single use and
//! proximity, and records every outcome in an append-only ledger.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use echomark::prelude::*;
//!
//! # async fn run() -> Result<(), EchomarkError> {
//! let orchestrator = SessionOrchestrator::builder().build(MemoryLedger::new(), SystemClock)?;
//!
//! let session = orchestrator
//!     .create_session(SessionConfig {
//!         subject: "Data Structures".into(),
//!         class_id: "CS-201".into(),
//!         teacher_id: "t-lovelace".into(),
//!         location: RoomLocation::point("Room 101", GeoPoint::new(51.5246, -0.1340), 30.0),
//!         window: std::time::Duration::from_secs(10 * 60),
//!         device_binding: true,
//!     })
//!     .await?;
//! let _audio = orchestrator.stream_token_audio(session.id).await?;
//! orchestrator.start_session(session.id).await?;
//! // Play each frame from `audio` through the speaker...
//! # Ok(())
//! # }
//! ```

mod broadcast;
mod config;
mod error;
mod orchestrator;
mod stream;

pub use config::OrchestratorConfig;
pub use error::EchomarkError;
pub use orchestrator::{Evidence, OrchestratorBuilder, SessionOrchestrator, Submission};
pub use stream::TokenAudioStream;

pub use echomark_ledger as ledger;
pub use echomark_protocol as protocol;
pub use echomark_session as session;
pub use echomark_tick as tick;
pub use echomark_verify as verify;

/// Everything needed to run attendance sessions.
pub mod prelude {
    pub use crate::{
        EchomarkError, Evidence, OrchestratorBuilder, OrchestratorConfig, SessionOrchestrator,
        Submission, TokenAudioStream,
    };
    pub use echomark_ledger::{
        AttendanceLedger, JsonlLedger, LedgerEntry, MemoryLedger, PersistenceError,
        SessionSummary, Statistics,
    };
    pub use echomark_protocol::{
        AudioFrame, ClassId, CodecConfig, DecodeError, DeviceId, FskCodec, SessionId, StudentId,
        SubjectId, TeacherId, Timestamp, Token, TokenCodec,
    };
    pub use echomark_session::{
        ClaimedLocation, Clock, GeoPoint, ManualClock, RoomLocation, Session, SessionConfig,
        SessionError, SessionLimits, SessionState, SystemClock,
    };
    pub use echomark_verify::{Outcome, VerifierConfig};
}
