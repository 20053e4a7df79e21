//! # Cardsched
//!
//! Spaced-repetition scheduling and card-state engine for flashcard decks.
//!
//! Cardsched decides which card a learner sees next, evolves each card's
//! interval after an answer, durably logs every review, and keeps dated
//! backups of the deck files it manages.
//!
//! ## Features
//!
//! - One `SQLite` connection per deck file via [`ConnectionRegistry`]
//! - Time-ordered, collision-free 64-bit ids via [`IdGenerator`]
//! - Pluggable review selection ([`SelectionStrategy`]) and interval
//!   policies ([`IntervalPolicy`])
//! - Append-only review history
//! - At most one backup per deck per calendar day
//!
//! ## Example
//!
//! ```rust,ignore
//! use cardsched::{ConnectionRegistry, Outcome, Scheduler};
//!
//! let registry = ConnectionRegistry::new();
//! let deck = registry.acquire("decks/spanish.anki")?;
//! let scheduler = Scheduler::sqlite();
//!
//! let card = scheduler.present_next(&deck)?;
//! let card = scheduler.record_answer(&deck, &card, Outcome::Remembered, 4_200)?;
//! registry.release_all();
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{BackupSettings, CardschedConfig, LoggingSettings};
pub use models::{
    BackupOutcome, BackupRecord, Card, CardId, Ease, Outcome, RestoreOutcome, ReviewCandidate,
    ReviewFlags, ReviewLogEntry,
};
pub use services::{
    BackupManager, Clock, DoublingPolicy, FileSystem, FixedClock, IdGenerator, IntervalPolicy,
    OsFileSystem, RandomSelection, Scheduler, SelectionPolicy, SelectionStrategy,
    SmallestIntervalFirst, SystemClock,
};
pub use storage::{
    CardStore, ConnectionRegistry, Deck, ReviewLog, SqliteCardStore, SqliteReviewLog,
};

/// Error type for cardsched operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed outcome names, unknown selection policy, bad CLI arguments |
/// | `OperationFailed` | Config files cannot be read or parsed, logging cannot be initialized |
/// | `StorageUnavailable` | A deck connection cannot be opened, was released, or a query fails |
/// | `CardNotFound` | The requested card id is not in the deck |
/// | `StorageIntegrity` | A value read back after a write differs from the value written |
/// | `NoCardsAvailable` | Presenting the next card from an empty deck |
/// | `BackupFailed` | Copying a deck file into or out of the backup directory fails |
/// | `DeckInUse` | Restoring a deck that still has an open connection |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A non-storage operation failed.
    ///
    /// Raised when:
    /// - The configuration file cannot be read or parsed
    /// - Logging has already been initialized
    /// - The backup or broken-deck directory cannot be created
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The deck store could not be reached.
    ///
    /// Raised when:
    /// - `SQLite` cannot open the deck file
    /// - A deck handle is used after [`ConnectionRegistry::release`]
    /// - A query or transaction statement fails
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The storage operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No card with the given id exists in the deck.
    #[error("card {0} not found")]
    CardNotFound(CardId),

    /// The interval read back after an update does not match what was written.
    ///
    /// This is never retried; the surrounding transaction is rolled back.
    #[error("storage integrity failure for card {card_id}: wrote {written}, read back {read_back}")]
    StorageIntegrity {
        /// The card being updated.
        card_id: CardId,
        /// The interval that was written.
        written: f64,
        /// The interval that was read back.
        read_back: f64,
    },

    /// The deck has no cards to present.
    #[error("no cards available for review")]
    NoCardsAvailable,

    /// Copying a deck file for backup or restore failed.
    ///
    /// Any partially written target file has been removed.
    #[error("backup of '{}' failed: {cause}", path.display())]
    BackupFailed {
        /// The target path of the failed copy.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// The deck still has an open connection.
    #[error("deck '{}' is in use", .0.display())]
    DeckInUse(PathBuf),
}

impl Error {
    /// Builds a [`Error::StorageUnavailable`] from any displayable cause.
    pub fn storage(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for cardsched operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use cardsched::current_timestamp_millis;
///
/// let ts = current_timestamp_millis();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
