//! The attendance ledger: append-only source of truth for outcomes and
//! statistics.
//!
//! - [`AttendanceLedger`]: the storage trait the orchestrator writes to.
//! - [`MemoryLedger`]: in-process, for tests and short-lived runs.
//! - [`JsonlLedger`]: a JSON-lines file replayed on open.
//!
//! Only session records and [`LedgerEntry`] values are persisted.

mod entry;
mod error;
mod index;
mod jsonl;
mod ledger;
mod memory;

pub use entry::{LedgerEntry, SessionSummary, Statistics};
pub use error::PersistenceError;
pub use jsonl::JsonlLedger;
pub use ledger::AttendanceLedger;
pub use memory::MemoryLedger;
