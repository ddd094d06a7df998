//! The per-session token audio stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use echomark_protocol::{AudioFrame, SessionId};
use futures_util::Stream;
use tokio::sync::mpsc;

/// Audio frames for one session, one per issued token, in issue order.
///
/// Ends when the session closes. Frames the consumer does not take in time
/// are dropped by the producer rather than queued, since a stale token is
/// useless to play.
#[derive(Debug)]
pub struct TokenAudioStream {
    session_id: SessionId,
    frames: mpsc::Receiver<AudioFrame>,
}

impl TokenAudioStream {
    pub(crate) fn new(session_id: SessionId, frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self { session_id, frames }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Waits for the next frame; `None` once the session has closed.
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }
}

impl Stream for TokenAudioStream {
    type Item = AudioFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_recv(cx)
    }
}
