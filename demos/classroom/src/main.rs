//! A simulated lecture: one teacher broadcast, a handful of students.
//!
//! ```text
//! RUST_LOG=debug ECHOMARK_CONFIG=echomark.json cargo run -p classroom
//! ```

use std::path::PathBuf;
use std::time::Duration;

use echomark::prelude::*;
use echomark::session::EARTH_RADIUS_M;
use futures_util::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

const LECTURE_HALL: GeoPoint = GeoPoint::new(51.5246, -0.1340);

/// Reads `ECHOMARK_CONFIG` if set, otherwise uses the defaults.
fn load_config() -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    match std::env::var_os("ECHOMARK_CONFIG") {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(parse_config(&text)?)
        }
        None => Ok(OrchestratorConfig::default()),
    }
}

fn parse_config(text: &str) -> Result<OrchestratorConfig, serde_json::Error> {
    serde_json::from_str(text)
}

fn ledger_path() -> PathBuf {
    std::env::var_os("ECHOMARK_LEDGER")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("echomark-classroom.jsonl"))
}

/// A point `metres` due north of the lecture hall.
fn north_of_hall(metres: f64) -> ClaimedLocation {
    ClaimedLocation::Point(GeoPoint::new(
        LECTURE_HALL.latitude + (metres / EARTH_RADIUS_M).to_degrees(),
        LECTURE_HALL.longitude,
    ))
}

/// What a phone microphone a few metres away picks up: a quieter copy.
fn attenuate(frame: &AudioFrame, gain: f32) -> AudioFrame {
    AudioFrame::new(
        frame.sample_rate,
        frame.samples.iter().map(|s| s * gain).collect(),
    )
}

fn heard(
    session: SessionId,
    frame: &AudioFrame,
    student: &str,
    device: &str,
    metres: f64,
) -> Submission {
    Submission {
        session_id: session,
        evidence: Evidence::Audio(attenuate(frame, 0.4)),
        student_id: student.into(),
        device_id: device.into(),
        location: north_of_hall(metres),
        capture_time: Timestamp::now(),
    }
}

// ---------------------------------------------------------------------------
// Lecture
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ledger = JsonlLedger::open(ledger_path()).await?;
    let orchestrator = SessionOrchestrator::builder()
        .config(load_config()?)
        .build(ledger, SystemClock)?;

    let session = orchestrator
        .create_session(SessionConfig {
            subject: "Data Structures".into(),
            class_id: "CS-201".into(),
            teacher_id: "t-lovelace".into(),
            location: RoomLocation::point("Lecture Hall 1", LECTURE_HALL, 30.0),
            window: Duration::from_secs(60),
            device_binding: true,
        })
        .await?;
    let mut speaker = orchestrator.stream_token_audio(session.id).await?;
    orchestrator.start_session(session.id).await?;

    let Some(first) = speaker.next().await else {
        return Err("broadcast ended before the first token".into());
    };
    info!(samples = first.len(), duration_ms = first.duration().as_millis() as u64, "token playing");

    // Students in the room hear the first token.
    for (student, device, metres) in [("s-ada", "phone-ada", 8.0), ("s-grace", "phone-grace", 21.0)] {
        let outcome = orchestrator
            .submit_attendance(heard(session.id, &first, student, device, metres))
            .await?;
        info!(student, %outcome, "in the room");
    }

    // Across the quad: the audio was relayed, the location gives it away.
    let outcome = orchestrator
        .submit_attendance(heard(session.id, &first, "s-bob", "phone-bob", 140.0))
        .await?;
    info!(student = "s-bob", %outcome, "relayed audio");

    // Ada's phone tries to mark a friend present on the next token.
    let Some(second) = speaker.next().await else {
        return Err("broadcast ended early".into());
    };
    let outcome = orchestrator
        .submit_attendance(heard(session.id, &second, "s-mallory", "phone-ada", 8.0))
        .await?;
    info!(student = "s-mallory", %outcome, "borrowed phone");

    // A recording of the first token replayed after it expired.
    let outcome = orchestrator
        .submit_attendance(heard(session.id, &first, "s-eve", "phone-eve", 5.0))
        .await?;
    info!(student = "s-eve", %outcome, "replayed recording");

    orchestrator.stop_session(session.id).await?;

    // Arrives after the teacher closed attendance.
    let outcome = orchestrator
        .submit_attendance(heard(session.id, &second, "s-alan", "phone-alan", 3.0))
        .await?;
    info!(student = "s-alan", %outcome, "late arrival");

    let summary = orchestrator.session_summary(session.id).await?;
    info!(
        accepted = summary.accepted,
        location = summary.rejected_location,
        duplicate = summary.rejected_duplicate,
        expired = summary.rejected_expired,
        unknown = summary.rejected_unknown_token,
        "session summary"
    );

    let stats = orchestrator
        .get_statistics(&"s-ada".into(), &"Data Structures".into())
        .await?;
    info!(
        present = stats.present,
        total = stats.total,
        percentage = format!("{:.1}", stats.percentage),
        ledger = %ledger_path().display(),
        "attendance for s-ada"
    );
    Ok(())
}
