//! `SQLite` card store.
//!
//! Every update runs inside one `BEGIN IMMEDIATE` transaction on the deck's
//! connection: read the current row, compute the next state, write every
//! field, then read the row back and compare the interval bit for bit.
//! A mismatch rolls the transaction back and surfaces
//! [`Error::StorageIntegrity`]. The caller's `on_write` hook runs last, on the
//! same transaction, so whatever it writes commits together with the card.

use crate::models::{Card, CardId, ReviewCandidate};
use crate::storage::sqlite::{record_operation_metrics, with_immediate_transaction};
use crate::storage::traits::{CardStore, CardUpdate};
use crate::storage::Deck;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const CARD_COLUMNS: &str = "id, question, answer, interval, lastInterval, factor, lastFactor, \
     reps, yesCount, noCount, due, created, modified";

/// Card store backed by the deck's `cards` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCardStore;

impl SqliteCardStore {
    /// Creates a card store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: CardId::new(row.get(0)?),
        question: row.get(1)?,
        answer: row.get(2)?,
        interval: row.get(3)?,
        last_interval: row.get(4)?,
        factor: row.get(5)?,
        last_factor: row.get(6)?,
        reps: row.get(7)?,
        yes_count: row.get(8)?,
        no_count: row.get(9)?,
        due: row.get(10)?,
        created: row.get(11)?,
        modified: row.get(12)?,
    })
}

fn fetch_card(conn: &Connection, id: CardId, operation: &str) -> Result<Card> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
        params![id.as_i64()],
        card_from_row,
    )
    .optional()
    .map_err(|e| Error::storage(operation, e))?
    .ok_or(Error::CardNotFound(id))
}

fn write_card(conn: &Connection, card: &Card) -> Result<usize> {
    conn.execute(
        "UPDATE cards SET question = ?2, answer = ?3, interval = ?4, lastInterval = ?5,
             factor = ?6, lastFactor = ?7, reps = ?8, yesCount = ?9, noCount = ?10,
             due = ?11, created = ?12, modified = ?13
         WHERE id = ?1",
        params![
            card.id.as_i64(),
            card.question,
            card.answer,
            card.interval,
            card.last_interval,
            card.factor,
            card.last_factor,
            card.reps,
            card.yes_count,
            card.no_count,
            card.due,
            card.created,
            card.modified,
        ],
    )
    .map_err(|e| Error::storage("write_card", e))
}

impl CardStore for SqliteCardStore {
    #[instrument(skip(self, deck, card), fields(operation = "insert", backend = BACKEND, card.id = %card.id))]
    fn insert(&self, deck: &Deck, card: &Card) -> Result<()> {
        let start = Instant::now();
        let result = deck.with_connection("insert_card", |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO cards ({CARD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    card.id.as_i64(),
                    card.question,
                    card.answer,
                    card.interval,
                    card.last_interval,
                    card.factor,
                    card.last_factor,
                    card.reps,
                    card.yes_count,
                    card.no_count,
                    card.due,
                    card.created,
                    card.modified,
                ],
            )
            .map_err(|e| Error::storage("insert_card", e))?;
            Ok(())
        });
        record_operation_metrics(BACKEND, "insert", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "get", backend = BACKEND, card.id = %id))]
    fn get(&self, deck: &Deck, id: CardId) -> Result<Card> {
        let start = Instant::now();
        let result = deck.with_connection("get_card", |conn| fetch_card(conn, id, "get_card"));
        record_operation_metrics(BACKEND, "get", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "list", backend = BACKEND))]
    fn list(&self, deck: &Deck) -> Result<Vec<Card>> {
        let start = Instant::now();
        let result = deck.with_connection("list_cards", |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY id"))
                .map_err(|e| Error::storage("list_cards", e))?;
            let rows = stmt
                .query_map([], card_from_row)
                .map_err(|e| Error::storage("list_cards", e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("list_cards", e))
        });
        record_operation_metrics(BACKEND, "list", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "candidates", backend = BACKEND))]
    fn candidates(&self, deck: &Deck) -> Result<Vec<ReviewCandidate>> {
        let start = Instant::now();
        let result = deck.with_connection("list_candidates", |conn| {
            let mut stmt = conn
                .prepare("SELECT id, interval, due, reps FROM cards ORDER BY id")
                .map_err(|e| Error::storage("list_candidates", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ReviewCandidate {
                        id: CardId::new(row.get(0)?),
                        interval: row.get(1)?,
                        due: row.get(2)?,
                        reps: row.get(3)?,
                    })
                })
                .map_err(|e| Error::storage("list_candidates", e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("list_candidates", e))
        });
        record_operation_metrics(BACKEND, "candidates", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck), fields(operation = "count", backend = BACKEND))]
    fn count(&self, deck: &Deck) -> Result<usize> {
        let start = Instant::now();
        let result = deck.with_connection("count_cards", |conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))
                .map_err(|e| Error::storage("count_cards", e))?;
            Ok(usize::try_from(count).unwrap_or(0))
        });
        record_operation_metrics(BACKEND, "count", start, result.is_ok());
        result
    }

    #[instrument(skip(self, deck, transition, on_write), fields(operation = "update", backend = BACKEND, card.id = %id))]
    fn update_with(
        &self,
        deck: &Deck,
        id: CardId,
        transition: &dyn Fn(&Card) -> Card,
        on_write: &dyn Fn(&Connection, &CardUpdate) -> Result<()>,
    ) -> Result<CardUpdate> {
        let start = Instant::now();
        let result = deck.with_connection("update_card", |conn| {
            with_immediate_transaction(conn, |conn| {
                let before = fetch_card(conn, id, "read_card")?;
                let mut next = transition(&before);
                next.id = id;

                if write_card(conn, &next)? == 0 {
                    return Err(Error::CardNotFound(id));
                }

                let after = fetch_card(conn, id, "verify_card")?;
                if after.interval.to_bits() != next.interval.to_bits() {
                    tracing::error!(
                        card.id = %id,
                        written = next.interval,
                        read_back = after.interval,
                        "interval read back differs from interval written"
                    );
                    metrics::counter!("storage_integrity_failures_total").increment(1);
                    return Err(Error::StorageIntegrity {
                        card_id: id,
                        written: next.interval,
                        read_back: after.interval,
                    });
                }
                let update = CardUpdate { before, after };
                on_write(conn, &update)?;
                Ok(update)
            })
        });
        record_operation_metrics(BACKEND, "update", start, result.is_ok());
        result
    }
}
