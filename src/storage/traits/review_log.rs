//! Review log trait.

use crate::Result;
use crate::models::{CardId, ReviewLogEntry};
use crate::storage::Deck;
use rusqlite::Connection;

/// Append-only history of reviews.
pub trait ReviewLog: Send + Sync {
    /// Appends an entry on a connection that may already be inside a
    /// transaction. Existing entries are never changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the write fails.
    fn append_in(&self, conn: &Connection, entry: &ReviewLogEntry) -> Result<()>;

    /// Appends an entry as its own statement on the deck's connection.
    ///
    /// # Errors
    ///
    /// Same as [`append_in`](Self::append_in).
    fn append(&self, deck: &Deck, entry: &ReviewLogEntry) -> Result<()> {
        deck.with_connection("append_review", |conn| self.append_in(conn, entry))
    }

    /// Returns every entry in write order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the query fails.
    fn scan(&self, deck: &Deck) -> Result<Vec<ReviewLogEntry>>;

    /// Returns one card's entries in write order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the query fails.
    fn scan_card(&self, deck: &Deck, card_id: CardId) -> Result<Vec<ReviewLogEntry>> {
        Ok(self
            .scan(deck)?
            .into_iter()
            .filter(|entry| entry.card_id == card_id)
            .collect())
    }
}
