//! The session manager: registry of every live attendance session.
//!
//! Each session sits in its own `Arc<Mutex<LiveSession>>` cell. The
//! registry lock is only held long enough to look a cell up or insert one,
//! so claims against different sessions never wait on each other.
//!
//! ```text
//! create_session() ──→ start_session() ──→ issue_next_token() ...
//!        │                    │                     │
//!        ▼                    ▼                     ▼
//!    [Pending] ─────→   [Broadcasting]  ──→  close_session()
//!        │                                          │
//!        └──────────────(close_session)─────────────┤
//!                                                   ▼
//!                                               [Closed] ──→ evict_closed()
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use echomark_protocol::{SessionId, Timestamp, Token};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{LiveSession, Session, SessionConfig, SessionError, SessionLimits};

/// Shared handle to one session's mutable state.
pub type SessionCell = Arc<Mutex<LiveSession>>;

/// Registry of sessions, keyed by id.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionCell>>,
    limits: SessionLimits,
}

impl SessionManager {
    /// Creates an empty manager. The limits are checked up front so every
    /// session created later is guaranteed consistent pacing.
    pub fn new(limits: SessionLimits) -> Result<Self, SessionError> {
        limits.validate()?;
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
        })
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Validates `config` and registers a new `Pending` session.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidConfig`] if the config is rejected.
    pub async fn create_session(
        &self,
        config: SessionConfig,
        now: Timestamp,
    ) -> Result<Session, SessionError> {
        config.validate(&self.limits)?;

        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = SessionId(rand::rng().random());
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Session::new(id, config, &self.limits, now);
        sessions.insert(id, Arc::new(Mutex::new(LiveSession::new(session.clone()))));

        info!(
            session_id = %id,
            subject = %session.subject,
            class = %session.class_id,
            room = %session.location.label,
            window_secs = session.window.as_secs(),
            "session created"
        );
        Ok(session)
    }

    /// Looks up a session's cell.
    pub async fn get(&self, id: SessionId) -> Option<SessionCell> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn cell(&self, id: SessionId) -> Result<SessionCell, SessionError> {
        self.get(id).await.ok_or(SessionError::NotFound(id))
    }

    /// `Pending → Broadcasting`.
    ///
    /// # Errors
    /// [`SessionError::NotFound`], or [`SessionError::InvalidTransition`]
    /// if the session is already broadcasting or closed.
    pub async fn start_session(&self, id: SessionId, now: Timestamp) -> Result<Session, SessionError> {
        let cell = self.cell(id).await?;
        let mut live = cell.lock().await;
        live.start(now)?;
        Ok(live.session().clone())
    }

    /// Mints the session's next token.
    ///
    /// # Errors
    /// [`SessionError::NotFound`], or [`SessionError::NotBroadcasting`].
    pub async fn issue_next_token(&self, id: SessionId, now: Timestamp) -> Result<Token, SessionError> {
        let cell = self.cell(id).await?;
        let mut live = cell.lock().await;
        live.issue_next_token(now)
    }

    /// Closes a session. Idempotent: returns `Ok(false)` if it was already
    /// closed.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the id is unknown.
    pub async fn close_session(&self, id: SessionId, now: Timestamp) -> Result<bool, SessionError> {
        let cell = self.cell(id).await?;
        let mut live = cell.lock().await;
        Ok(live.close(now))
    }

    /// A copy of the session record as it is right now.
    pub async fn snapshot(&self, id: SessionId) -> Option<Session> {
        let cell = self.get(id).await?;
        let live = cell.lock().await;
        Some(live.session().clone())
    }

    /// Drops a session from the registry.
    pub async fn remove(&self, id: SessionId) -> Option<SessionCell> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Removes sessions closed at least `older_than` before `now`.
    ///
    /// Returns the evicted ids. Claims against them are then answered as
    /// if the session never existed.
    pub async fn evict_closed(&self, older_than: Duration, now: Timestamp) -> Vec<SessionId> {
        let cutoff = now.saturating_sub(older_than);
        let mut sessions = self.sessions.write().await;

        let mut evicted = Vec::new();
        for (id, cell) in sessions.iter() {
            // A cell that is locked right now is busy, so it is not stale.
            let Ok(live) = cell.try_lock() else {
                continue;
            };
            if matches!(live.session().closed_at, Some(at) if at <= cutoff) {
                evicted.push(*id);
            }
        }
        for id in &evicted {
            sessions.remove(id);
        }

        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted closed sessions");
        }
        evicted
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
