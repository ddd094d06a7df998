//! `SessionOrchestrator` builder and operations.
//!
//! This is the entry point for taking attendance. It ties together all the
//! layers: session → broadcast → codec → verifier → ledger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use echomark_ledger::{AttendanceLedger, LedgerEntry, SessionSummary, Statistics};
use echomark_protocol::{
    AudioFrame, CodecConfig, DeviceId, FskCodec, SessionId, StudentId, SubjectId, Timestamp,
    Token, TokenCodec,
};
use echomark_session::{
    ClaimedLocation, Clock, Session, SessionConfig, SessionError, SessionLimits, SessionManager,
    SessionState,
};
use echomark_tick::TickConfig;
use echomark_verify::{AttendanceClaim, Outcome, ProximityVerifier, VerifierConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broadcast::{self, Broadcast, BroadcastHandle};
use crate::{EchomarkError, OrchestratorConfig, TokenAudioStream};

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// What a student device presents as proof it heard the broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Evidence {
    /// Raw captured audio; decoded by the orchestrator.
    Audio(AudioFrame),
    /// A token the device already decoded itself.
    Token(Token),
}

/// One attendance submission from a student device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub session_id: SessionId,
    pub evidence: Evidence,
    pub student_id: StudentId,
    pub device_id: DeviceId,
    pub location: ClaimedLocation,
    pub capture_time: Timestamp,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The two ends of a session's audio channel, until each is handed out.
struct StreamSlot {
    /// Taken by the broadcast task on start.
    frames: Option<mpsc::Sender<AudioFrame>>,
    /// Taken by the one caller of `stream_token_audio`.
    consumer: Option<mpsc::Receiver<AudioFrame>>,
}

/// Shared orchestrator state, passed to each broadcast task.
pub(crate) struct Inner<L, C> {
    pub(crate) sessions: SessionManager,
    pub(crate) ledger: L,
    pub(crate) clock: C,
    pub(crate) codec: FskCodec,
    verifier: ProximityVerifier,
    config: OrchestratorConfig,
    pub(crate) broadcasts: Mutex<HashMap<SessionId, BroadcastHandle>>,
    streams: Mutex<HashMap<SessionId, StreamSlot>>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`SessionOrchestrator`].
///
/// # Example
///
/// ```rust,ignore
/// use echomark::prelude::*;
///
/// let orchestrator = SessionOrchestrator::builder()
///     .limits(SessionLimits::default())
///     .frame_buffer(8)
///     .build(MemoryLedger::new(), SystemClock)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn limits(mut self, limits: SessionLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn verifier(mut self, verifier: VerifierConfig) -> Self {
        self.config.verifier = verifier;
        self
    }

    /// Audio frames buffered per session (at least 1).
    pub fn frame_buffer(mut self, frames: usize) -> Self {
        self.config.frame_buffer = frames;
        self
    }

    pub fn initial_jitter(mut self, jitter: Duration) -> Self {
        self.config.initial_jitter = jitter;
        self
    }

    /// Validates the configuration and builds the orchestrator.
    ///
    /// # Errors
    /// [`EchomarkError::Config`] for inconsistent limits,
    /// [`EchomarkError::Protocol`] for an unusable codec config.
    pub fn build<L, C>(self, ledger: L, clock: C) -> Result<SessionOrchestrator<L, C>, EchomarkError>
    where
        L: AttendanceLedger,
        C: Clock,
    {
        let mut config = self.config;
        config.limits.validate()?;
        config.frame_buffer = config.frame_buffer.max(1);

        let codec = FskCodec::new(config.codec.clone())?;
        let sessions = SessionManager::new(config.limits.clone())?;
        let verifier = ProximityVerifier::new(config.verifier.clone());

        Ok(SessionOrchestrator {
            inner: Arc::new(Inner {
                sessions,
                ledger,
                clock,
                codec,
                verifier,
                config,
                broadcasts: Mutex::new(HashMap::new()),
                streams: Mutex::new(HashMap::new()),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates sessions, broadcasts, verification and the ledger.
///
/// Cheap to clone; clones share the same state. Claims against different
/// sessions never wait on each other.
pub struct SessionOrchestrator<L, C> {
    inner: Arc<Inner<L, C>>,
}

impl<L, C> Clone for SessionOrchestrator<L, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SessionOrchestrator<(), ()> {
    /// Creates a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }
}

impl<L, C> SessionOrchestrator<L, C>
where
    L: AttendanceLedger,
    C: Clock,
{
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &L {
        &self.inner.ledger
    }

    pub fn codec(&self) -> &FskCodec {
        &self.inner.codec
    }

    // -- lifecycle ----------------------------------------------------------

    /// Creates a `Pending` session and records it in the ledger.
    ///
    /// # Errors
    /// [`SessionError::InvalidConfig`] for a rejected config, or a
    /// persistence error (in which case the session is discarded).
    pub async fn create_session(&self, config: SessionConfig) -> Result<Session, EchomarkError> {
        let inner = &self.inner;
        let session = inner.sessions.create_session(config, inner.clock.now()).await?;

        let (frames, consumer) = mpsc::channel(inner.config.frame_buffer);
        inner.streams.lock().await.insert(
            session.id,
            StreamSlot {
                frames: Some(frames),
                consumer: Some(consumer),
            },
        );

        if let Err(e) = inner.ledger.record_session(session.clone()).await {
            inner.sessions.remove(session.id).await;
            inner.streams.lock().await.remove(&session.id);
            return Err(e.into());
        }
        Ok(session)
    }

    /// Starts broadcasting: issues the first token immediately and spawns
    /// the task that re-issues on a timer and closes the session when its
    /// window elapses.
    ///
    /// # Errors
    /// [`SessionError::NotFound`], [`SessionError::InvalidTransition`] if
    /// the session is not `Pending`, or a persistence error (in which case
    /// the session is closed again).
    pub async fn start_session(&self, id: SessionId) -> Result<(), EchomarkError> {
        let inner = &self.inner;
        let cell = inner
            .sessions
            .get(id)
            .await
            .ok_or(SessionError::NotFound(id))?;

        let mut live = cell.lock().await;
        let now = inner.clock.now();
        live.start(now)?;
        let first = live.issue_next_token(now)?;
        let session = live.session().clone();

        if let Err(e) = inner.ledger.record_session(session.clone()).await {
            live.close(inner.clock.now());
            return Err(e.into());
        }

        let frames = inner
            .streams
            .lock()
            .await
            .get_mut(&id)
            .and_then(|slot| slot.frames.take())
            .unwrap_or_else(|| {
                warn!(session_id = %id, "no audio channel for session, broadcasting without one");
                mpsc::channel(1).0
            });
        match frames.try_send(inner.codec.encode(&first)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %id, sequence = first.sequence, "audio consumer lagging, frame dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %id, sequence = first.sequence, "no audio consumer");
            }
        }

        // Registered before the session lock is released, so a concurrent
        // stop always finds the handle.
        let handle = broadcast::spawn(
            Arc::clone(inner),
            Broadcast {
                session_id: id,
                cell: Arc::clone(&cell),
                frames,
                timer: TickConfig {
                    interval: session.reissue_interval,
                    initial_jitter: inner.config.initial_jitter,
                    ..TickConfig::default()
                },
                window_ends: Instant::now() + session.window,
            },
        );
        inner.broadcasts.lock().await.insert(id, handle);
        drop(live);
        Ok(())
    }

    /// Closes a session and stops its broadcast. Idempotent.
    ///
    /// When this returns, no further token will be issued for the session
    /// and its audio stream has ended.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for an unknown id, or a persistence
    /// error if the closed record could not be stored.
    pub async fn stop_session(&self, id: SessionId) -> Result<(), EchomarkError> {
        let inner = &self.inner;
        let cell = inner
            .sessions
            .get(id)
            .await
            .ok_or(SessionError::NotFound(id))?;

        let closed = {
            let mut live = cell.lock().await;
            live.close(inner.clock.now()).then(|| live.session().clone())
        };

        let handle = inner.broadcasts.lock().await.remove(&id);
        if let Some(handle) = handle {
            handle.stop(id).await;
        }
        // Drops an unused sender, which ends the stream of a never-started session.
        if let Some(slot) = inner.streams.lock().await.get_mut(&id) {
            slot.frames = None;
        }

        match closed {
            Some(session) => inner.ledger.record_session(session).await?,
            None => debug!(session_id = %id, "stop on closed session"),
        }
        Ok(())
    }

    // -- claims -------------------------------------------------------------

    /// Decides a submission, records the outcome and returns it.
    ///
    /// Audio is decoded before the session lock is taken. The ledger write
    /// happens before the redemption is committed, so on a persistence
    /// error the token stays unredeemed.
    ///
    /// # Errors
    /// [`SessionError::SessionNotActive`] while the session is `Pending`,
    /// or a persistence error. Every other result is an [`Outcome`].
    pub async fn submit_attendance(&self, submission: Submission) -> Result<Outcome, EchomarkError> {
        let inner = &self.inner;
        let Submission {
            session_id,
            evidence,
            student_id,
            device_id,
            location,
            capture_time,
        } = submission;

        let token = match evidence {
            Evidence::Token(token) => Some(token),
            Evidence::Audio(frame) => match inner.codec.decode(&frame) {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(session_id = %session_id, student = %student_id, error = %e, "audio did not decode");
                    None
                }
            },
        };

        let claim = AttendanceClaim {
            session_id,
            token,
            student_id,
            device_id,
            location,
            capture_time,
        };

        let Some(cell) = inner.sessions.get(session_id).await else {
            warn!(session_id = %session_id, student = %claim.student_id, "claim for unknown session");
            return Ok(Outcome::RejectedExpired);
        };

        let mut live = cell.lock().await;
        if live.state() == SessionState::Pending {
            return Err(SessionError::SessionNotActive(session_id).into());
        }

        let now = inner.clock.now();
        let outcome = inner.verifier.evaluate(&claim, Some(&*live), now);
        inner
            .ledger
            .append(LedgerEntry::from_claim(&claim, outcome, now))
            .await?;
        if outcome.is_accepted() {
            ProximityVerifier::commit(&claim, &mut live);
        } else {
            info!(
                session_id = %session_id,
                student = %claim.student_id,
                sequence = ?claim.token.map(|t| t.sequence),
                ?outcome,
                "attendance rejected"
            );
        }
        Ok(outcome)
    }

    // -- queries ------------------------------------------------------------

    /// A student's attendance across the started sessions of a subject.
    pub async fn get_statistics(
        &self,
        student: &StudentId,
        subject: &SubjectId,
    ) -> Result<Statistics, EchomarkError> {
        Ok(self.inner.ledger.statistics(student, subject).await?)
    }

    /// Hands out the session's token audio stream. Each session has exactly
    /// one.
    ///
    /// # Errors
    /// [`SessionError::NotFound`], or [`EchomarkError::StreamUnavailable`]
    /// if the stream was already taken.
    pub async fn stream_token_audio(&self, id: SessionId) -> Result<TokenAudioStream, EchomarkError> {
        let consumer = self
            .inner
            .streams
            .lock()
            .await
            .get_mut(&id)
            .map(|slot| slot.consumer.take());
        match consumer {
            Some(Some(frames)) => Ok(TokenAudioStream::new(id, frames)),
            Some(None) => Err(EchomarkError::StreamUnavailable(id)),
            None => Err(SessionError::NotFound(id).into()),
        }
    }

    /// Number of broadcast tasks still running.
    pub async fn active_broadcasts(&self) -> usize {
        self.inner.broadcasts.lock().await.len()
    }

    /// The session record as it is now.
    pub async fn session(&self, id: SessionId) -> Option<Session> {
        self.inner.sessions.snapshot(id).await
    }

    /// The most recently issued token, if the session has broadcast.
    pub async fn current_token(&self, id: SessionId) -> Option<Token> {
        let cell = self.inner.sessions.get(id).await?;
        let live = cell.lock().await;
        live.current_token().copied()
    }

    /// Ledger entries for a session, in submission order.
    pub async fn session_entries(&self, id: SessionId) -> Result<Vec<LedgerEntry>, EchomarkError> {
        Ok(self.inner.ledger.query(id).await?)
    }

    /// Outcome tally for a session.
    pub async fn session_summary(&self, id: SessionId) -> Result<SessionSummary, EchomarkError> {
        Ok(self.inner.ledger.summary(id).await?)
    }

    /// Forgets sessions closed at least `older_than` ago. Their ledger
    /// records stay; claims against them become `RejectedExpired`.
    pub async fn evict_closed(&self, older_than: Duration) -> Vec<SessionId> {
        let inner = &self.inner;
        let evicted = inner
            .sessions
            .evict_closed(older_than, inner.clock.now())
            .await;
        if !evicted.is_empty() {
            let mut broadcasts = inner.broadcasts.lock().await;
            let mut streams = inner.streams.lock().await;
            for id in &evicted {
                broadcasts.remove(id);
                streams.remove(id);
            }
        }
        evicted
    }
}
