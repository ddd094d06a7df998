//! End-to-end tests for the session orchestrator.
//!
//! Wall-clock time comes from a `ManualClock`; Tokio time is paused where
//! the broadcast timer matters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use echomark::prelude::*;
use echomark::session::EARTH_RADIUS_M;
use futures_util::StreamExt;

// =========================================================================
// Helpers
// =========================================================================

const START: Timestamp = Timestamp(1_760_000_000_000);

type Orchestrator<L = MemoryLedger> = SessionOrchestrator<L, ManualClock>;

fn orchestrator() -> (Orchestrator, ManualClock) {
    let clock = ManualClock::new(START);
    let o = SessionOrchestrator::builder()
        .build(MemoryLedger::new(), clock.clone())
        .expect("default config is valid");
    (o, clock)
}

fn config(subject: &str) -> SessionConfig {
    SessionConfig {
        subject: subject.into(),
        class_id: "CS-201".into(),
        teacher_id: "t-lovelace".into(),
        location: RoomLocation::point("Room 101", GeoPoint::new(0.0, 0.0), 30.0),
        window: Duration::from_secs(10 * 60),
        device_binding: true,
    }
}

fn north_of_origin(metres: f64) -> ClaimedLocation {
    ClaimedLocation::Point(GeoPoint::new((metres / EARTH_RADIUS_M).to_degrees(), 0.0))
}

fn submission(token: Token, student: &str, device: &str, metres: f64) -> Submission {
    Submission {
        session_id: token.session_id,
        evidence: Evidence::Token(token),
        student_id: student.into(),
        device_id: device.into(),
        location: north_of_origin(metres),
        capture_time: token.issued_at.saturating_add(Duration::from_millis(50)),
    }
}

async fn broadcasting<L: AttendanceLedger>(o: &Orchestrator<L>, subject: &str) -> (Session, Token) {
    let session = o.create_session(config(subject)).await.unwrap();
    o.start_session(session.id).await.unwrap();
    let token = o.current_token(session.id).await.expect("first token issued on start");
    (session, token)
}

// =========================================================================
// Scenario
// =========================================================================

#[tokio::test]
async fn test_submit_attendance_classroom_scenario() {
    let (o, clock) = orchestrator();
    let (session, token) = broadcasting(&o, "Data Structures").await;
    assert_eq!(token.sequence, 1);
    clock.advance(Duration::from_millis(100));

    // The student's phone hears the broadcast audio.
    let audio = o.codec().encode(&token);
    let heard = |metres| Submission {
        evidence: Evidence::Audio(audio.clone()),
        ..submission(token, "s-grace", "phone-grace", metres)
    };

    assert_eq!(o.submit_attendance(heard(31.0)).await.unwrap(), Outcome::RejectedLocation);
    assert_eq!(o.submit_attendance(heard(29.0)).await.unwrap(), Outcome::Accepted);
    assert_eq!(o.submit_attendance(heard(29.0)).await.unwrap(), Outcome::RejectedDuplicate);

    o.stop_session(session.id).await.unwrap();
    assert_eq!(
        o.submit_attendance(submission(token, "s-alan", "phone-alan", 0.0))
            .await
            .unwrap(),
        Outcome::RejectedExpired
    );

    let outcomes: Vec<Outcome> = o
        .session_entries(session.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(
        outcomes,
        [
            Outcome::RejectedLocation,
            Outcome::Accepted,
            Outcome::RejectedDuplicate,
            Outcome::RejectedExpired,
        ]
    );

    let summary = o.session_summary(session.id).await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.total(), 4);
}

#[tokio::test]
async fn test_submit_attendance_undecodable_audio_is_unknown_token() {
    let (o, _clock) = orchestrator();
    let (session, token) = broadcasting(&o, "Networks").await;

    let silence = AudioFrame::new(48_000, vec![0.0; 48_000]);
    let outcome = o
        .submit_attendance(Submission {
            evidence: Evidence::Audio(silence),
            ..submission(token, "s-1", "d-1", 0.0)
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::RejectedUnknownToken);
    let entries = o.session_entries(session.id).await.unwrap();
    assert_eq!(entries[0].sequence, None);
}

// =========================================================================
// Closure and transitions
// =========================================================================

#[tokio::test]
async fn test_stop_session_closure_is_absorbing() {
    let (o, clock) = orchestrator();
    let (session, token) = broadcasting(&o, "Compilers").await;
    o.stop_session(session.id).await.unwrap();

    for i in 0..5 {
        clock.advance(Duration::from_millis(10));
        let outcome = o
            .submit_attendance(submission(token, &format!("s-{i}"), &format!("d-{i}"), 0.0))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::RejectedExpired);
    }

    assert!(matches!(
        o.start_session(session.id).await,
        Err(EchomarkError::Session(SessionError::InvalidTransition {
            from: SessionState::Closed,
            ..
        }))
    ));
    assert_eq!(o.current_token(session.id).await, Some(token));
}

#[tokio::test]
async fn test_stop_session_is_idempotent() {
    let (o, clock) = orchestrator();
    let (session, _) = broadcasting(&o, "Compilers").await;

    o.stop_session(session.id).await.unwrap();
    let closed_at = o.session(session.id).await.unwrap().closed_at;
    clock.advance(Duration::from_secs(5));
    o.stop_session(session.id).await.unwrap();

    assert_eq!(o.session(session.id).await.unwrap().closed_at, closed_at);
    assert_eq!(
        o.ledger().session(session.id).await.unwrap().state,
        SessionState::Closed
    );
}

#[tokio::test]
async fn test_stop_session_pending_closes_it() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Compilers")).await.unwrap();
    o.stop_session(session.id).await.unwrap();
    assert_eq!(
        o.session(session.id).await.unwrap().state,
        SessionState::Closed
    );
}

#[tokio::test]
async fn test_start_session_twice_is_invalid_transition() {
    let (o, _clock) = orchestrator();
    let (session, _) = broadcasting(&o, "Compilers").await;
    assert!(matches!(
        o.start_session(session.id).await,
        Err(EchomarkError::Session(SessionError::InvalidTransition {
            from: SessionState::Broadcasting,
            to: SessionState::Broadcasting,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_submit_attendance_pending_session_is_not_active() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Compilers")).await.unwrap();
    let forged = Token {
        session_id: session.id,
        sequence: 1,
        issued_at: START,
        ttl_ms: 2_500,
        nonce: [0; 8],
    };
    assert!(matches!(
        o.submit_attendance(submission(forged, "s-1", "d-1", 0.0)).await,
        Err(EchomarkError::Session(SessionError::SessionNotActive(_)))
    ));
    assert!(o.session_entries(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_attendance_unknown_session_is_expired_and_unrecorded() {
    let (o, _clock) = orchestrator();
    let ghost = Token {
        session_id: SessionId(0xBAD),
        sequence: 1,
        issued_at: START,
        ttl_ms: 2_500,
        nonce: [1; 8],
    };
    assert_eq!(
        o.submit_attendance(submission(ghost, "s-1", "d-1", 0.0)).await.unwrap(),
        Outcome::RejectedExpired
    );
    assert!(o.ledger().is_empty().await);
}

#[tokio::test]
async fn test_create_session_invalid_config_is_rejected() {
    let (o, _clock) = orchestrator();
    let err = o
        .create_session(SessionConfig {
            subject: "".into(),
            ..config("x")
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EchomarkError::Session(SessionError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_stop_session_unknown_is_not_found() {
    let (o, _clock) = orchestrator();
    assert!(matches!(
        o.stop_session(SessionId(1)).await,
        Err(EchomarkError::Session(SessionError::NotFound(_)))
    ));
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_attendance_concurrent_claims_redeem_token_once() {
    let (o, _clock) = orchestrator();
    let (session, token) = broadcasting(&o, "Distributed Systems").await;

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let o = o.clone();
            tokio::spawn(async move {
                o.submit_attendance(submission(token, &format!("s-{i}"), &format!("d-{i}"), 1.0))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut accepted = 0;
    let mut duplicate = 0;
    for task in tasks {
        match task.await.unwrap() {
            Outcome::Accepted => accepted += 1,
            Outcome::RejectedDuplicate => duplicate += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(duplicate, 31);
    assert_eq!(o.session_entries(session.id).await.unwrap().len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_attendance_sessions_are_independent() {
    let (o, _clock) = orchestrator();
    let (_, a) = broadcasting(&o, "Math").await;
    let (_, b) = broadcasting(&o, "Art").await;

    let (ra, rb) = tokio::join!(
        o.submit_attendance(submission(a, "s-1", "d-1", 0.0)),
        o.submit_attendance(submission(b, "s-1", "d-1", 0.0)),
    );
    assert_eq!(ra.unwrap(), Outcome::Accepted);
    assert_eq!(rb.unwrap(), Outcome::Accepted);
}

// =========================================================================
// Audio stream
// =========================================================================

#[tokio::test]
async fn test_stream_token_audio_yields_first_token_and_ends_on_stop() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Signals")).await.unwrap();
    let mut stream = o.stream_token_audio(session.id).await.unwrap();
    o.start_session(session.id).await.unwrap();

    let frame = stream.next().await.expect("first frame");
    let token = o.codec().decode(&frame).unwrap();
    assert_eq!(Some(token), o.current_token(session.id).await);

    o.stop_session(session.id).await.unwrap();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_token_audio_only_once() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Signals")).await.unwrap();
    let _stream = o.stream_token_audio(session.id).await.unwrap();
    assert!(matches!(
        o.stream_token_audio(session.id).await,
        Err(EchomarkError::StreamUnavailable(id)) if id == session.id
    ));
    assert!(matches!(
        o.stream_token_audio(SessionId(3)).await,
        Err(EchomarkError::Session(SessionError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_start_session_with_dropped_stream_still_broadcasts() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Signals")).await.unwrap();
    drop(o.stream_token_audio(session.id).await.unwrap());

    o.start_session(session.id).await.unwrap();
    assert_eq!(o.current_token(session.id).await.unwrap().sequence, 1);
    assert_eq!(o.active_broadcasts().await, 1);
    o.stop_session(session.id).await.unwrap();
}

#[tokio::test]
async fn test_stream_token_audio_pending_session_ends_on_stop() {
    let (o, _clock) = orchestrator();
    let session = o.create_session(config("Signals")).await.unwrap();
    let mut stream = o.stream_token_audio(session.id).await.unwrap();
    o.stop_session(session.id).await.unwrap();
    assert!(stream.next_frame().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_reissues_and_closes_when_window_elapses() {
    let (o, _clock) = orchestrator();
    let session = o
        .create_session(SessionConfig {
            window: Duration::from_secs(60),
            ..config("Signals")
        })
        .await
        .unwrap();
    let stream = o.stream_token_audio(session.id).await.unwrap();
    o.start_session(session.id).await.unwrap();

    // Paused time auto-advances through every re-issue to the window's end.
    let frames: Vec<AudioFrame> = stream.collect().await;

    let sequences: Vec<u32> = frames
        .iter()
        .map(|f| o.codec().decode(f).unwrap().sequence)
        .collect();
    assert!(sequences.len() > 10, "got {} frames", sequences.len());
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sequences[0], 1);

    let closed = o.session(session.id).await.unwrap();
    assert_eq!(closed.state, SessionState::Closed);
    assert_eq!(
        o.ledger().session(session.id).await.unwrap().state,
        SessionState::Closed
    );
    // The finished task unregistered itself.
    assert_eq!(o.active_broadcasts().await, 0);
    o.stop_session(session.id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_session_no_token_issued_after_return() {
    let (o, _clock) = orchestrator();
    let (session, _) = broadcasting(&o, "Signals").await;

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    assert_eq!(o.active_broadcasts().await, 1);
    o.stop_session(session.id).await.unwrap();
    assert_eq!(o.active_broadcasts().await, 0);
    let last = o.current_token(session.id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(o.current_token(session.id).await, Some(last));
    assert_eq!(last.sequence, 3);
}

// =========================================================================
// Statistics
// =========================================================================

#[tokio::test]
async fn test_get_statistics_seventeen_of_twenty_is_85_percent() {
    let (o, clock) = orchestrator();
    for i in 0..20 {
        let (session, token) = broadcasting(&o, "Physics").await;
        if i < 17 {
            assert!(
                o.submit_attendance(submission(token, "s-ada", "phone-ada", 5.0))
                    .await
                    .unwrap()
                    .is_accepted()
            );
        }
        o.stop_session(session.id).await.unwrap();
        clock.advance(Duration::from_secs(60));
    }
    // A session that never started does not count.
    o.create_session(config("Physics")).await.unwrap();

    let stats = o
        .get_statistics(&"s-ada".into(), &"Physics".into())
        .await
        .unwrap();
    assert_eq!(stats.present, 17);
    assert_eq!(stats.total, 20);
    assert_eq!(stats.percentage, 85.0);
}

// =========================================================================
// Persistence failures
// =========================================================================

/// A ledger whose appends can be made to fail.
#[derive(Default)]
struct FlakyLedger {
    inner: MemoryLedger,
    failing: AtomicBool,
}

impl AttendanceLedger for FlakyLedger {
    async fn record_session(&self, session: Session) -> Result<(), PersistenceError> {
        self.inner.record_session(session).await
    }

    async fn append(&self, entry: LedgerEntry) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("disk detached".into()));
        }
        self.inner.append(entry).await
    }

    async fn query(&self, session_id: SessionId) -> Result<Vec<LedgerEntry>, PersistenceError> {
        self.inner.query(session_id).await
    }

    async fn statistics(
        &self,
        student: &StudentId,
        subject: &SubjectId,
    ) -> Result<Statistics, PersistenceError> {
        self.inner.statistics(student, subject).await
    }

    async fn summary(&self, session_id: SessionId) -> Result<SessionSummary, PersistenceError> {
        self.inner.summary(session_id).await
    }
}

#[tokio::test]
async fn test_submit_attendance_ledger_failure_is_persistence_error_not_rejection() {
    let clock = ManualClock::new(START);
    let o: Orchestrator<FlakyLedger> = SessionOrchestrator::builder()
        .build(FlakyLedger::default(), clock)
        .unwrap();
    let (_, token) = broadcasting(&o, "Databases").await;

    o.ledger().failing.store(true, Ordering::SeqCst);
    assert!(matches!(
        o.submit_attendance(submission(token, "s-1", "d-1", 0.0)).await,
        Err(EchomarkError::Persistence(PersistenceError::Unavailable(_)))
    ));

    // The failed write left the token unredeemed.
    o.ledger().failing.store(false, Ordering::SeqCst);
    assert_eq!(
        o.submit_attendance(submission(token, "s-1", "d-1", 0.0)).await.unwrap(),
        Outcome::Accepted
    );
}

// =========================================================================
// Eviction
// =========================================================================

#[tokio::test]
async fn test_evict_closed_forgets_session_but_keeps_ledger() {
    let (o, clock) = orchestrator();
    let (session, token) = broadcasting(&o, "History").await;
    o.submit_attendance(submission(token, "s-1", "d-1", 0.0)).await.unwrap();
    o.stop_session(session.id).await.unwrap();

    clock.advance(Duration::from_secs(600));
    assert_eq!(o.evict_closed(Duration::from_secs(300)).await, vec![session.id]);

    assert!(o.session(session.id).await.is_none());
    assert_eq!(
        o.submit_attendance(submission(token, "s-2", "d-2", 0.0)).await.unwrap(),
        Outcome::RejectedExpired
    );
    assert_eq!(o.session_entries(session.id).await.unwrap().len(), 1);
}
