//! `SQLite` review history.

use crate::models::{CardId, Ease, ReviewFlags, ReviewLogEntry};
use crate::storage::Deck;
use crate::storage::sqlite::record_operation_metrics;
use crate::storage::traits::ReviewLog;
use crate::{Error, Result};
use rusqlite::{Connection, Row, params};
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const ENTRY_COLUMNS: &str = "time, cardId, ease, reps, lastInterval, nextInterval, lastFactor, \
     nextFactor, thinkingTime, delay, yesCount, noCount, flags";

/// Review log backed by the deck's `reviewHistory` table.
///
/// Entries are only ever inserted. Reads return them in insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteReviewLog;

impl SqliteReviewLog {
    /// Creates a review log.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewLogEntry> {
    let ease_code: i64 = row.get(2)?;
    let ease = Ease::from_code(ease_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("unknown ease code {ease_code}").into(),
        )
    })?;
    Ok(ReviewLogEntry {
        time: row.get(0)?,
        card_id: CardId::new(row.get(1)?),
        ease,
        rep: row.get(3)?,
        last_interval: row.get(4)?,
        interval: row.get(5)?,
        last_factor: row.get(6)?,
        factor: row.get(7)?,
        user_time: row.get(8)?,
        delay: row.get(9)?,
        yes_count: row.get(10)?,
        no_count: row.get(11)?,
        flags: ReviewFlags::from_code(row.get(12)?),
    })
}

fn query_entries(deck: &Deck, filter: Option<CardId>) -> Result<Vec<ReviewLogEntry>> {
    deck.with_connection("scan_review_log", |conn| {
        let sql = match filter {
            Some(_) => format!(
                "SELECT {ENTRY_COLUMNS} FROM reviewHistory WHERE cardId = ?1 ORDER BY rowid"
            ),
            None => format!("SELECT {ENTRY_COLUMNS} FROM reviewHistory ORDER BY rowid"),
        };
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::storage("scan_review_log", e))?;
        let rows = match filter {
            Some(card_id) => stmt.query_map(params![card_id.as_i64()], entry_from_row),
            None => stmt.query_map([], entry_from_row),
        }
        .map_err(|e| Error::storage("scan_review_log", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::storage("scan_review_log", e))
    })
}

impl ReviewLog for SqliteReviewLog {
    #[instrument(skip(self, conn, entry), fields(operation = "append", backend = BACKEND, card.id = %entry.card_id))]
    fn append_in(&self, conn: &Connection, entry: &ReviewLogEntry) -> Result<()> {
        let start = Instant::now();
        let result = conn
            .execute(
                &format!(
                    "INSERT INTO reviewHistory ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    entry.time,
                    entry.card_id.as_i64(),
                    entry.ease.code(),
                    entry.rep,
                    entry.last_interval,
                    entry.interval,
                    entry.last_factor,
                    entry.factor,
                    entry.user_time,
                    entry.delay,
                    entry.yes_count,
                    entry.no_count,
                    entry.flags.code(),
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::storage("append_review", e));
        record_operation_metrics(BACKEND, "append", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "scan", backend = BACKEND))]
    fn scan(&self, deck: &Deck) -> Result<Vec<ReviewLogEntry>> {
        let start = Instant::now();
        let result = query_entries(deck, None);
        record_operation_metrics(BACKEND, "scan", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "scan_card", backend = BACKEND, card.id = %card_id))]
    fn scan_card(&self, deck: &Deck, card_id: CardId) -> Result<Vec<ReviewLogEntry>> {
        let start = Instant::now();
        let result = query_entries(deck, Some(card_id));
        record_operation_metrics(BACKEND, "scan_card", start, result.is_ok());
        result
    }
}
