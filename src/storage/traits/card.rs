//! Card store trait.

use crate::models::{Card, CardId, Outcome, ReviewCandidate};
use crate::services::{IntervalPolicy, SelectionStrategy};
use crate::storage::Deck;
use crate::{Error, Result};
use rusqlite::Connection;

/// A card before and after an update.
#[derive(Debug, Clone, PartialEq)]
pub struct CardUpdate {
    /// State read inside the update transaction.
    pub before: Card,
    /// State written and verified.
    pub after: Card,
}

/// Durable access to a deck's cards.
///
/// Implementations must run the read, the write, the verifying read and the
/// `on_write` hook of [`update_with`](Self::update_with) as one transaction
/// that no other update of the same card can interleave with.
pub trait CardStore: Send + Sync {
    /// Inserts a new card.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the write fails, including
    /// when the id already exists.
    fn insert(&self, deck: &Deck, card: &Card) -> Result<()>;

    /// Loads a card by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CardNotFound`] if no such card exists.
    fn get(&self, deck: &Deck, id: CardId) -> Result<Card>;

    /// Returns every card in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    fn list(&self, deck: &Deck) -> Result<Vec<Card>>;

    /// Returns the selection view of every card.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    fn candidates(&self, deck: &Deck) -> Result<Vec<ReviewCandidate>> {
        Ok(self.list(deck)?.iter().map(ReviewCandidate::from).collect())
    }

    /// Returns the number of cards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    fn count(&self, deck: &Deck) -> Result<usize> {
        Ok(self.candidates(deck)?.len())
    }

    /// Reads a card, applies `transition`, writes the result and reads it back,
    /// then runs `on_write` on the same connection before committing.
    ///
    /// Nothing is committed unless `on_write` succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::CardNotFound`] if the card does not exist
    /// - [`Error::StorageIntegrity`] if the value read back differs from the
    ///   value written
    /// - Whatever `on_write` returns
    /// - [`Error::StorageUnavailable`] for any other storage failure
    fn update_with(
        &self,
        deck: &Deck,
        id: CardId,
        transition: &dyn Fn(&Card) -> Card,
        on_write: &dyn Fn(&Connection, &CardUpdate) -> Result<()>,
    ) -> Result<CardUpdate>;

    /// [`update_with`](Self::update_with) without a hook.
    ///
    /// # Errors
    ///
    /// Same as [`update_with`](Self::update_with).
    fn update(
        &self,
        deck: &Deck,
        id: CardId,
        transition: &dyn Fn(&Card) -> Card,
    ) -> Result<CardUpdate> {
        self.update_with(deck, id, transition, &|_, _| Ok(()))
    }

    /// Picks one card for review using `strategy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCardsAvailable`] if the deck is empty.
    fn select_for_review(
        &self,
        deck: &Deck,
        strategy: &dyn SelectionStrategy,
        now_millis: i64,
    ) -> Result<Card> {
        let candidates = self.candidates(deck)?;
        let id = strategy
            .select(&candidates, now_millis)
            .ok_or(Error::NoCardsAvailable)?;
        self.get(deck, id)
    }

    /// Applies a review outcome to a card using `policy`, running `on_write`
    /// inside the same transaction.
    ///
    /// # Errors
    ///
    /// Same as [`update_with`](Self::update_with).
    fn apply_outcome(
        &self,
        deck: &Deck,
        id: CardId,
        outcome: Outcome,
        policy: &dyn IntervalPolicy,
        now_millis: i64,
        on_write: &dyn Fn(&Connection, &CardUpdate) -> Result<()>,
    ) -> Result<CardUpdate> {
        self.update_with(
            deck,
            id,
            &|card| policy.apply(card, outcome, now_millis),
            on_write,
        )
    }
}
