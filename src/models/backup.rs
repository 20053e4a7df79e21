//! Backup snapshot types.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Extension used by deck files and their snapshots.
pub const DECK_EXTENSION: &str = "anki";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A dated snapshot of a deck file: `<deck>-<YYYY-MM-DD>.anki`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackupRecord {
    /// Calendar date the snapshot was taken.
    pub date: NaiveDate,
    /// Deck file name without extension.
    pub deck_name: String,
    /// Location of the snapshot.
    pub path: PathBuf,
}

impl BackupRecord {
    /// Returns the snapshot file name for a deck on a given date.
    #[must_use]
    pub fn file_name(deck_name: &str, date: NaiveDate) -> String {
        format!("{deck_name}-{}.{DECK_EXTENSION}", date.format(DATE_FORMAT))
    }

    /// Builds the record for a deck snapshot inside `backup_dir`.
    #[must_use]
    pub fn new(backup_dir: &Path, deck_name: &str, date: NaiveDate) -> Self {
        Self {
            date,
            deck_name: deck_name.to_string(),
            path: backup_dir.join(Self::file_name(deck_name, date)),
        }
    }

    /// Parses a snapshot path, returning `None` for files that do not follow
    /// the naming scheme.
    #[must_use]
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(&format!(".{DECK_EXTENSION}"))?;
        // "-YYYY-MM-DD" is 11 bytes.
        let split = stem.len().checked_sub(11)?;
        if !stem.is_char_boundary(split) {
            return None;
        }
        let (deck_name, suffix) = stem.split_at(split);
        let date_str = suffix.strip_prefix('-')?;
        let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()?;
        if deck_name.is_empty() {
            return None;
        }
        Some(Self {
            date,
            deck_name: deck_name.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Result of a backup request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A new snapshot was written.
    Created(BackupRecord),
    /// A snapshot for today already exists and was left untouched.
    AlreadyBackedUpToday(BackupRecord),
    /// Free space at the backup location is below what the copy needs.
    InsufficientSpace {
        /// Bytes needed.
        required: u64,
        /// Bytes available.
        available: u64,
    },
    /// Backups are turned off in the configuration.
    Disabled,
}

/// Result of a restore request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The deck file was replaced by the snapshot.
    Restored {
        /// Where the replaced deck file was moved, if one existed.
        quarantined: Option<PathBuf>,
    },
    /// Free space at the deck location is below what the copy needs.
    InsufficientSpace {
        /// Bytes needed.
        required: u64,
        /// Bytes available.
        available: u64,
    },
}
