//! Data models for cardsched.
//!
//! This module contains the core data structures shared by storage and
//! scheduling.

mod backup;
mod card;
mod review;

pub use backup::{BackupOutcome, BackupRecord, DECK_EXTENSION, RestoreOutcome};
pub use card::{
    Card, CardId, CardState, DEFAULT_FACTOR, Ease, MILLIS_PER_DAY, Outcome, RELEARNING_INTERVAL,
    ReviewCandidate, days_to_millis,
};
pub use review::{ReviewFlags, ReviewLogEntry};
