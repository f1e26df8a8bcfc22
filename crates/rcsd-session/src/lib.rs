//! Durable run state for the RCSD pipeline.
//!
//! A run's stage, artifacts and exit code are recoverable after a restart
//! from [`RunStore`]; [`RunJournal`] keeps an append-only history of what
//! happened to each run.

pub mod journal;
pub mod store;

pub use journal::{FileRunJournal, JournalEntry, JournalEvent, RunJournal};
pub use store::{FileRunStore, RunStore};
