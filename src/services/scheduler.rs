//! Review scheduling.
//!
//! [`Scheduler`] ties the pieces together: it asks a [`CardStore`] for the
//! next card, applies an [`IntervalPolicy`] to the learner's answer, and
//! appends the review to a [`ReviewLog`] inside the same transaction as the
//! card write.

use crate::models::{
    Card, CardId, Ease, Outcome, RELEARNING_INTERVAL, ReviewFlags, ReviewLogEntry, days_to_millis,
};
use crate::services::{Clock, IdGenerator, RandomSelection, SelectionStrategy, SystemClock};
use crate::storage::{CardStore, CardUpdate, Deck, ReviewLog, SqliteCardStore, SqliteReviewLog};
use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::Arc;
use tracing::instrument;

/// Computes a card's next state from a review outcome.
pub trait IntervalPolicy: Send + Sync {
    /// Returns the interval (days) that follows `interval` after `outcome`.
    fn next_interval(&self, interval: f64, outcome: Outcome) -> f64;

    /// Returns the card as it should be stored after `outcome` at `now_millis`.
    ///
    /// The default records the previous interval and factor, counts the
    /// repetition and the answer, and moves the due date.
    fn apply(&self, card: &Card, outcome: Outcome, now_millis: i64) -> Card {
        let interval = self.next_interval(card.interval, outcome);
        let mut next = card.clone();
        next.last_interval = card.interval;
        next.last_factor = card.factor;
        next.interval = interval;
        next.reps += 1;
        match outcome {
            Outcome::Remembered => next.yes_count += 1,
            Outcome::Forgotten => next.no_count += 1,
        }
        next.due = now_millis.saturating_add(days_to_millis(interval));
        next.modified = now_millis;
        next
    }
}

/// Pure doubling growth.
///
/// - remembered: `0 -> 1`, relearning `0.1 -> 1`, otherwise `x -> 2x`
/// - forgotten: any interval `-> 0.1`
///
/// The factor is carried unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoublingPolicy;

impl IntervalPolicy for DoublingPolicy {
    #[allow(clippy::float_cmp)]
    fn next_interval(&self, interval: f64, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Forgotten => RELEARNING_INTERVAL,
            Outcome::Remembered if interval == 0.0 || interval == RELEARNING_INTERVAL => 1.0,
            Outcome::Remembered => interval * 2.0,
        }
    }
}

/// Orchestrates review selection, state transitions, and history.
pub struct Scheduler {
    store: Arc<dyn CardStore>,
    log: Arc<dyn ReviewLog>,
    strategy: Box<dyn SelectionStrategy>,
    policy: Arc<dyn IntervalPolicy>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdGenerator>,
}

impl Scheduler {
    /// Creates a scheduler over the given backends with random selection,
    /// doubling intervals, and the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn CardStore>, log: Arc<dyn ReviewLog>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            log,
            strategy: Box::new(RandomSelection::new()),
            policy: Arc::new(DoublingPolicy),
            ids: Arc::new(IdGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Creates a scheduler over the `SQLite` deck backends.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::new(Arc::new(SqliteCardStore::new()), Arc::new(SqliteReviewLog::new()))
    }

    /// Replaces the selection strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the interval policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn IntervalPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the clock. The id generator is rebuilt on the new clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = Arc::new(IdGenerator::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    /// Shares an existing id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Returns the card store.
    #[must_use]
    pub fn store(&self) -> &dyn CardStore {
        self.store.as_ref()
    }

    /// Returns the review log.
    #[must_use]
    pub fn review_log(&self) -> &dyn ReviewLog {
        self.log.as_ref()
    }

    /// Returns the active selection strategy name.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Adds a new card with a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the question is blank, or a storage
    /// error if the insert fails.
    #[instrument(skip(self, deck, question, answer), fields(deck = %deck.name()))]
    pub fn add_card(&self, deck: &Deck, question: &str, answer: &str) -> Result<Card> {
        if question.trim().is_empty() {
            return Err(Error::InvalidInput("question cannot be empty".to_string()));
        }
        let id = CardId::new(self.ids.next_id());
        let card = Card::new(id, question, answer, self.clock.now_millis());
        self.store.insert(deck, &card)?;
        tracing::debug!(card.id = %id, "added card");
        Ok(card)
    }

    /// Returns the next card to review.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCardsAvailable`] if the deck has no cards.
    #[instrument(skip(self, deck), fields(deck = %deck.name(), strategy = self.strategy.name()))]
    pub fn present_next(&self, deck: &Deck) -> Result<Card> {
        self.store
            .select_for_review(deck, self.strategy.as_ref(), self.clock.now_millis())
    }

    /// Applies the learner's answer to `card` and logs the review.
    ///
    /// The card write, its verification and the review entry commit as one
    /// transaction. On any error the stored card is left as it was and
    /// nothing is logged, so the call can be retried.
    ///
    /// # Errors
    ///
    /// - [`Error::CardNotFound`] if the card is no longer in the deck
    /// - [`Error::StorageIntegrity`] if the write could not be verified
    /// - [`Error::StorageUnavailable`] if the deck cannot be reached or the
    ///   review cannot be logged
    #[instrument(skip(self, deck, card), fields(deck = %deck.name(), card.id = %card.id, outcome = %outcome))]
    pub fn record_answer(
        &self,
        deck: &Deck,
        card: &Card,
        outcome: Outcome,
        thinking_ms: i64,
    ) -> Result<Card> {
        let now = self.clock.now_millis();
        let update = self.store.apply_outcome(
            deck,
            card.id,
            outcome,
            self.policy.as_ref(),
            now,
            &|conn: &Connection, update: &CardUpdate| {
                let entry =
                    review_entry(update, outcome.ease(), ReviewFlags::Standard, thinking_ms, now);
                self.append_entry(conn, &entry)
            },
        )?;

        tracing::info!(
            interval = update.after.interval,
            last_interval = update.before.interval,
            "recorded answer"
        );
        metrics::counter!("reviews_recorded_total", "outcome" => outcome.as_str()).increment(1);
        Ok(update.after)
    }

    /// Moves a card to `interval` days out of band (cram, drill).
    ///
    /// The repetition count is unchanged; the log entry carries
    /// [`ReviewFlags::Rescheduled`] and [`Ease::None`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a negative or non-finite interval,
    /// otherwise the same errors as [`record_answer`](Self::record_answer).
    #[instrument(skip(self, deck), fields(deck = %deck.name(), card.id = %card_id))]
    pub fn reschedule(&self, deck: &Deck, card_id: CardId, interval: f64) -> Result<Card> {
        if !interval.is_finite() || interval < 0.0 {
            return Err(Error::InvalidInput(format!(
                "interval must be a non-negative number of days, got {interval}"
            )));
        }
        let now = self.clock.now_millis();
        let update = self.store.update_with(
            deck,
            card_id,
            &|card| {
                let mut next = card.clone();
                next.last_interval = card.interval;
                next.last_factor = card.factor;
                next.interval = interval;
                next.due = now.saturating_add(days_to_millis(interval));
                next.modified = now;
                next
            },
            &|conn: &Connection, update: &CardUpdate| {
                let entry = review_entry(update, Ease::None, ReviewFlags::Rescheduled, 0, now);
                self.append_entry(conn, &entry)
            },
        )?;

        tracing::info!(interval, "rescheduled card");
        Ok(update.after)
    }

    fn append_entry(&self, conn: &Connection, entry: &ReviewLogEntry) -> Result<()> {
        self.log.append_in(conn, entry).inspect_err(|e| {
            tracing::error!(
                card.id = %entry.card_id,
                error = %e,
                "review could not be logged, rolling back card update"
            );
        })
    }
}

fn review_entry(
    update: &CardUpdate,
    ease: Ease,
    flags: ReviewFlags,
    thinking_ms: i64,
    now_millis: i64,
) -> ReviewLogEntry {
    ReviewLogEntry {
        time: now_millis,
        card_id: update.after.id,
        ease,
        rep: update.after.reps,
        last_interval: update.before.interval,
        interval: update.after.interval,
        last_factor: update.before.factor,
        factor: update.after.factor,
        user_time: thinking_ms.max(0),
        delay: update.before.overdue_days(now_millis),
        yes_count: update.after.yes_count,
        no_count: update.after.no_count,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FixedClock, SmallestIntervalFirst};
    use test_case::test_case;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn scheduler(clock: &Arc<FixedClock>) -> Scheduler {
        let clock: Arc<dyn Clock> = Arc::clone(clock) as Arc<dyn Clock>;
        Scheduler::sqlite()
            .with_clock(clock)
            .with_strategy(Box::new(SmallestIntervalFirst))
    }

    #[test_case(0.0, Outcome::Remembered, 1.0 ; "new card learned")]
    #[test_case(1.0, Outcome::Remembered, 2.0 ; "learning doubles")]
    #[test_case(16.0, Outcome::Remembered, 32.0 ; "review doubles")]
    #[test_case(0.1, Outcome::Remembered, 1.0 ; "relearning returns to one day")]
    #[test_case(0.0, Outcome::Forgotten, 0.1 ; "new card forgotten")]
    #[test_case(64.0, Outcome::Forgotten, 0.1 ; "review card forgotten")]
    fn test_doubling_policy(interval: f64, outcome: Outcome, expected: f64) {
        assert!(float_eq(DoublingPolicy.next_interval(interval, outcome), expected));
    }

    #[test]
    fn test_apply_updates_counters() {
        let mut card = Card::new(CardId::new(1), "q", "a", 0);
        card.interval = 2.0;
        card.reps = 2;

        let next = DoublingPolicy.apply(&card, Outcome::Forgotten, 10_000);
        assert!(float_eq(next.last_interval, 2.0));
        assert!(float_eq(next.interval, 0.1));
        assert_eq!(next.reps, 3);
        assert_eq!(next.no_count, 1);
        assert_eq!(next.yes_count, 0);
        assert_eq!(next.due, 10_000 + 8_640_000);
        assert_eq!(next.modified, 10_000);
        assert!(float_eq(next.factor, card.factor));
    }

    #[test]
    fn test_record_answer_logs_review() {
        let clock = Arc::new(FixedClock::new(1_000_000));
        let scheduler = scheduler(&clock);
        let deck = Deck::open_in_memory("sched").unwrap();

        let card = scheduler.add_card(&deck, "gato", "cat").unwrap();
        let card = scheduler
            .record_answer(&deck, &card, Outcome::Remembered, 2_500)
            .unwrap();
        assert!(float_eq(card.interval, 1.0));

        let entries = scheduler.review_log().scan(&deck).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.card_id, card.id);
        assert_eq!(entry.ease, Ease::Mid);
        assert_eq!(entry.rep, 1);
        assert_eq!(entry.user_time, 2_500);
        assert_eq!(entry.time, 1_000_000);
        assert_eq!(entry.flags, ReviewFlags::Standard);
        assert!(float_eq(entry.last_interval, 0.0));
        assert!(float_eq(entry.interval, 1.0));
    }

    #[test]
    fn test_delay_is_days_overdue() {
        let clock = Arc::new(FixedClock::new(0));
        let scheduler = scheduler(&clock);
        let deck = Deck::open_in_memory("sched").unwrap();

        let card = scheduler.add_card(&deck, "q", "a").unwrap();
        let card = scheduler
            .record_answer(&deck, &card, Outcome::Remembered, 0)
            .unwrap();
        // Due one day later; answer three days later.
        clock.advance_days(3);
        scheduler
            .record_answer(&deck, &card, Outcome::Remembered, 0)
            .unwrap();

        let entries = scheduler.review_log().scan(&deck).unwrap();
        assert!(float_eq(entries[0].delay, 0.0));
        assert!(float_eq(entries[1].delay, 2.0));
    }

    #[test]
    fn test_reschedule_keeps_rep() {
        let clock = Arc::new(FixedClock::new(0));
        let scheduler = scheduler(&clock);
        let deck = Deck::open_in_memory("sched").unwrap();

        let card = scheduler.add_card(&deck, "q", "a").unwrap();
        let card = scheduler
            .record_answer(&deck, &card, Outcome::Remembered, 0)
            .unwrap();
        let moved = scheduler.reschedule(&deck, card.id, 7.0).unwrap();
        assert!(float_eq(moved.interval, 7.0));
        assert_eq!(moved.reps, 1);

        let entries = scheduler.review_log().scan(&deck).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].flags, ReviewFlags::Rescheduled);
        assert_eq!(entries[1].ease, Ease::None);
        assert_eq!(entries[1].rep, entries[0].rep);
    }

    #[test]
    fn test_sub_day_reschedule_doubles_on_next_answer() {
        let clock = Arc::new(FixedClock::new(0));
        let scheduler = scheduler(&clock);
        let deck = Deck::open_in_memory("sched").unwrap();

        let card = scheduler.add_card(&deck, "q", "a").unwrap();
        let card = scheduler.reschedule(&deck, card.id, 0.25).unwrap();
        let card = scheduler
            .record_answer(&deck, &card, Outcome::Remembered, 0)
            .unwrap();
        assert!(float_eq(card.interval, 0.5));
        assert!(float_eq(card.last_interval, 0.25));
    }

    #[test_case(-1.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    fn test_reschedule_rejects_bad_interval(interval: f64) {
        let scheduler = Scheduler::sqlite();
        let deck = Deck::open_in_memory("sched").unwrap();
        let result = scheduler.reschedule(&deck, CardId::new(1), interval);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_add_card_rejects_blank_question() {
        let scheduler = Scheduler::sqlite();
        let deck = Deck::open_in_memory("sched").unwrap();
        let result = scheduler.add_card(&deck, "   ", "a");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_present_next_empty_deck() {
        let scheduler = Scheduler::sqlite();
        let deck = Deck::open_in_memory("sched").unwrap();
        assert!(matches!(
            scheduler.present_next(&deck),
            Err(Error::NoCardsAvailable)
        ));
    }
}
