//! Deck file schema.
//!
//! Column names follow the established deck format so existing `.anki`
//! files open without conversion.

use crate::{Error, Result};
use rusqlite::Connection;

/// Schema version stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_CARDS: &str = "CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY NOT NULL,
    question TEXT NOT NULL DEFAULT '',
    answer TEXT NOT NULL DEFAULT '',
    interval REAL NOT NULL DEFAULT 0,
    lastInterval REAL NOT NULL DEFAULT 0,
    factor REAL NOT NULL DEFAULT 2.5,
    lastFactor REAL NOT NULL DEFAULT 2.5,
    reps INTEGER NOT NULL DEFAULT 0,
    yesCount INTEGER NOT NULL DEFAULT 0,
    noCount INTEGER NOT NULL DEFAULT 0,
    due INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0,
    modified INTEGER NOT NULL DEFAULT 0
)";

// Entries are read back in rowid order; no secondary index is kept.
const CREATE_REVIEW_HISTORY: &str = "CREATE TABLE IF NOT EXISTS reviewHistory (
    cardId INTEGER NOT NULL,
    time INTEGER NOT NULL,
    ease INTEGER NOT NULL,
    reps INTEGER NOT NULL,
    lastInterval REAL NOT NULL,
    nextInterval REAL NOT NULL,
    lastFactor REAL NOT NULL,
    nextFactor REAL NOT NULL,
    thinkingTime INTEGER NOT NULL,
    delay REAL NOT NULL DEFAULT 0,
    yesCount INTEGER NOT NULL,
    noCount INTEGER NOT NULL,
    flags INTEGER NOT NULL DEFAULT 0
)";

/// Creates the deck tables if they do not exist.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_CARDS)
        .map_err(|e| Error::storage("create_cards_table", e))?;
    conn.execute_batch(CREATE_REVIEW_HISTORY)
        .map_err(|e| Error::storage("create_review_history_table", e))?;

    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::storage("read_schema_version", e))?;
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| Error::storage("write_schema_version", e))?;
    }
    Ok(())
}
