//! File-backed ledger: one JSON record per line, append-only.
//!
//! On open the whole file is replayed into memory; afterwards every write
//! goes to the end of the file before it becomes visible to readers.
//!
//! ```text
//! {"record":"session","id":..., "state":"Broadcasting", ...}
//! {"record":"entry","session_id":..., "outcome":"Accepted", ...}
//! ```
//!
//! A later `session` record for the same id supersedes earlier ones.
//!
//! Only newline-terminated lines are committed records. An unterminated
//! final line is what a crash mid-append leaves behind: on open it is kept
//! if it parses and cut off if it does not. A failed append is rolled back
//! to the previous end of file; if even that fails the ledger refuses
//! further writes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use echomark_protocol::{SessionId, StudentId, SubjectId};
use echomark_session::Session;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::index::LedgerIndex;
use crate::{AttendanceLedger, LedgerEntry, PersistenceError, SessionSummary, Statistics};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LedgerRecord {
    Session(Session),
    Entry(LedgerEntry),
}

struct Inner {
    file: File,
    index: LedgerIndex,
    /// Length of the file up to the last committed record.
    end: u64,
    poisoned: bool,
}

impl Inner {
    fn apply(&mut self, record: LedgerRecord) {
        apply(&mut self.index, record);
    }
}

fn apply(index: &mut LedgerIndex, record: LedgerRecord) {
    match record {
        LedgerRecord::Session(session) => index.record_session(session),
        LedgerRecord::Entry(entry) => index.append(entry),
    }
}

/// What to do about an unterminated final line.
enum Tail {
    Clean,
    /// It parsed; only the newline is missing.
    Terminate,
    /// It did not parse; cut the file back to this length.
    Truncate(u64),
}

/// A ledger persisted to a JSON-lines file.
pub struct JsonlLedger {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonlLedger {
    /// Opens (or creates) the ledger at `path`, replaying existing records.
    ///
    /// # Errors
    /// [`PersistenceError::Io`] if the file cannot be read or opened, and
    /// [`PersistenceError::Corrupt`] naming the first unparseable line.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        let existing = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let committed = existing
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let (body, tail) = existing.split_at(committed);

        let mut index = LedgerIndex::default();
        for (i, line) in body.split(|&b| b == b'\n').enumerate() {
            if line.trim_ascii().is_empty() {
                continue;
            }
            let record = serde_json::from_slice(line).map_err(|source| PersistenceError::Corrupt {
                line: i + 1,
                source,
            })?;
            apply(&mut index, record);
        }

        let tail = if tail.is_empty() {
            Tail::Clean
        } else {
            match serde_json::from_slice::<LedgerRecord>(tail) {
                Ok(record) => {
                    apply(&mut index, record);
                    Tail::Terminate
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = body.iter().filter(|&&b| b == b'\n').count() + 1,
                        error = %e,
                        "discarding torn final record"
                    );
                    Tail::Truncate(committed as u64)
                }
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        match tail {
            Tail::Clean => {}
            Tail::Terminate => {
                file.write_all(b"\n").await?;
                file.flush().await?;
                file.sync_data().await?;
            }
            Tail::Truncate(len) => {
                file.set_len(len).await?;
                file.sync_data().await?;
            }
        }
        let end = file.metadata().await?.len();

        info!(
            path = %path.display(),
            sessions = index.session_count(),
            entries = index.len(),
            "ledger opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                index,
                end,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total entries across all sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn write(&self, record: LedgerRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_vec(&record).map_err(PersistenceError::Encode)?;
        line.push(b'\n');

        let mut inner = self.inner.lock().await;
        if inner.poisoned {
            return Err(PersistenceError::Unavailable(format!(
                "{} could not be restored after a failed write",
                self.path.display()
            )));
        }

        if let Err(e) = append_line(&mut inner.file, &line).await {
            let end = inner.end;
            match inner.file.set_len(end).await {
                Ok(()) => warn!(path = %self.path.display(), error = %e, "append failed, rolled back"),
                Err(rollback) => {
                    error!(path = %self.path.display(), error = %e, %rollback, "append failed and could not be rolled back");
                    inner.poisoned = true;
                }
            }
            return Err(e.into());
        }
        inner.end += line.len() as u64;

        if let LedgerRecord::Session(session) = &record {
            debug!(session_id = %session.id, state = ?session.state, "session persisted");
        }
        inner.apply(record);
        Ok(())
    }
}

async fn append_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

impl AttendanceLedger for JsonlLedger {
    async fn record_session(&self, session: Session) -> Result<(), PersistenceError> {
        self.write(LedgerRecord::Session(session)).await
    }

    async fn append(&self, entry: LedgerEntry) -> Result<(), PersistenceError> {
        self.write(LedgerRecord::Entry(entry)).await
    }

    async fn query(&self, session_id: SessionId) -> Result<Vec<LedgerEntry>, PersistenceError> {
        Ok(self.inner.lock().await.index.query(session_id))
    }

    async fn statistics(
        &self,
        student: &StudentId,
        subject: &SubjectId,
    ) -> Result<Statistics, PersistenceError> {
        Ok(self.inner.lock().await.index.statistics(student, subject))
    }

    async fn summary(&self, session_id: SessionId) -> Result<SessionSummary, PersistenceError> {
        Ok(self.inner.lock().await.index.summary(session_id))
    }
}
