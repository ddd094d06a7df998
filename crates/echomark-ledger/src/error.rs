//! Error types for the ledger.

/// The ledger could not read or write its records.
///
/// This is the one fatal condition in attendance taking. It means the
/// outcome is unknown, which is different from any rejection.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be parsed on replay.
    #[error("ledger record on line {line} is corrupt: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized.
    #[error("failed to encode ledger record: {0}")]
    Encode(#[source] serde_json::Error),

    /// The backing store is not reachable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
