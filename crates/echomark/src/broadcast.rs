//! The per-session broadcast task.
//!
//! One task per broadcasting session. It re-issues a token on every timer
//! tick, renders it to audio and pushes it into the session's stream. It
//! stops when cancelled by `stop_session` or closes the session itself when
//! the attendance window elapses, in which case it also unregisters its
//! handle.
//!
//! Issuance happens under the session lock and a closed session refuses to
//! issue, so once a close has returned no further token can appear.

use std::sync::Arc;

use echomark_ledger::AttendanceLedger;
use echomark_protocol::{AudioFrame, SessionId, TokenCodec};
use echomark_session::{Clock, SessionCell};
use echomark_tick::{TickConfig, TickPolicy, TickScheduler};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::orchestrator::Inner;

/// Handle kept by the orchestrator to stop a broadcast task.
pub(crate) struct BroadcastHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl BroadcastHandle {
    /// Signals the task and waits for it to finish.
    pub(crate) async fn stop(self, session_id: SessionId) {
        // The task may already have ended on its own (window elapsed).
        let _ = self.cancel.send(());
        if let Err(e) = self.task.await {
            error!(session_id = %session_id, error = %e, "broadcast task failed");
        }
    }
}

/// What the task needs besides the shared orchestrator state.
pub(crate) struct Broadcast {
    pub(crate) session_id: SessionId,
    pub(crate) cell: SessionCell,
    pub(crate) frames: mpsc::Sender<AudioFrame>,
    pub(crate) timer: TickConfig,
    pub(crate) window_ends: Instant,
}

/// Spawns the broadcast task for a session that has just started.
pub(crate) fn spawn<L, C>(inner: Arc<Inner<L, C>>, broadcast: Broadcast) -> BroadcastHandle
where
    L: AttendanceLedger,
    C: Clock,
{
    let (cancel, cancelled) = oneshot::channel();
    let task = tokio::spawn(run(inner, broadcast, cancelled));
    BroadcastHandle { cancel, task }
}

async fn run<L, C>(inner: Arc<Inner<L, C>>, broadcast: Broadcast, mut cancelled: oneshot::Receiver<()>)
where
    L: AttendanceLedger,
    C: Clock,
{
    let Broadcast {
        session_id,
        cell,
        frames,
        timer,
        window_ends,
    } = broadcast;

    let mut timer = TickScheduler::new(TickConfig {
        policy: TickPolicy::Skip,
        ..timer
    });
    info!(session_id = %session_id, interval_ms = timer.interval().as_millis() as u64, "broadcast started");

    loop {
        tokio::select! {
            biased;

            _ = &mut cancelled => {
                debug!(session_id = %session_id, "broadcast cancelled");
                break;
            }

            _ = time::sleep_until(window_ends) => {
                let closed = {
                    let mut live = cell.lock().await;
                    live.close(inner.clock.now()).then(|| live.session().clone())
                };
                if let Some(session) = closed {
                    info!(session_id = %session_id, "attendance window elapsed");
                    if let Err(e) = inner.ledger.record_session(session).await {
                        error!(session_id = %session_id, error = %e, "failed to persist closed session");
                    }
                }
                // Nobody will stop this task now; drop its own handle.
                inner.broadcasts.lock().await.remove(&session_id);
                break;
            }

            tick = timer.wait_for_tick() => {
                let mut live = cell.lock().await;
                let token = match live.issue_next_token(inner.clock.now()) {
                    Ok(token) => token,
                    // Closed between the tick and the lock.
                    Err(_) => break,
                };
                let frame = inner.codec.encode(&token);
                match frames.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(session_id = %session_id, sequence = token.sequence, "audio consumer lagging, frame dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(session_id = %session_id, tick = tick.tick, "no audio consumer");
                    }
                }
            }
        }
    }

    info!(session_id = %session_id, ticks = timer.tick_count(), "broadcast stopped");
}
