//! Review selection strategies.
//!
//! A strategy picks one card out of the deck's review candidates. The
//! default reproduces the uniform random pick decks have always used; the
//! ordered strategies are available through [`SelectionPolicy`].

use crate::models::{CardId, ReviewCandidate};
use crate::storage::acquire_lock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Mutex;

/// Chooses the next card to present.
pub trait SelectionStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Picks one candidate, or `None` if there are none.
    fn select(&self, candidates: &[ReviewCandidate], now_millis: i64) -> Option<CardId>;
}

/// Uniform random pick among all cards.
pub struct RandomSelection {
    rng: Mutex<StdRng>,
}

impl RandomSelection {
    /// Creates a strategy seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a strategy with a deterministic sequence.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RandomSelection {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, candidates: &[ReviewCandidate], _now_millis: i64) -> Option<CardId> {
        let mut rng = acquire_lock(&self.rng);
        candidates.choose(&mut *rng).map(|c| c.id)
    }
}

/// Smallest interval first; ties go to the earlier due time, then the lower id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallestIntervalFirst;

impl SelectionStrategy for SmallestIntervalFirst {
    fn name(&self) -> &'static str {
        "smallest-interval"
    }

    fn select(&self, candidates: &[ReviewCandidate], _now_millis: i64) -> Option<CardId> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.interval
                    .partial_cmp(&b.interval)
                    .unwrap_or(Ordering::Equal)
                    .then(a.due.cmp(&b.due))
                    .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id)
    }
}

/// Earliest due time first; ties go to the smaller interval, then the lower id.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarliestDueFirst;

impl SelectionStrategy for EarliestDueFirst {
    fn name(&self) -> &'static str {
        "earliest-due"
    }

    fn select(&self, candidates: &[ReviewCandidate], _now_millis: i64) -> Option<CardId> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.due
                    .cmp(&b.due)
                    .then(
                        a.interval
                            .partial_cmp(&b.interval)
                            .unwrap_or(Ordering::Equal),
                    )
                    .then(a.id.cmp(&b.id))
            })
            .map(|c| c.id)
    }
}

/// Configurable choice of selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// [`RandomSelection`].
    #[default]
    Random,
    /// [`SmallestIntervalFirst`].
    SmallestInterval,
    /// [`EarliestDueFirst`].
    EarliestDue,
}

impl SelectionPolicy {
    /// Returns the policy name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::SmallestInterval => "smallest-interval",
            Self::EarliestDue => "earliest-due",
        }
    }

    /// Parses a policy name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "random" => Some(Self::Random),
            "smallest-interval" | "interval" => Some(Self::SmallestInterval),
            "earliest-due" | "due" => Some(Self::EarliestDue),
            _ => None,
        }
    }

    /// Builds the strategy for this policy.
    #[must_use]
    pub fn build(self) -> Box<dyn SelectionStrategy> {
        match self {
            Self::Random => Box::new(RandomSelection::new()),
            Self::SmallestInterval => Box::new(SmallestIntervalFirst),
            Self::EarliestDue => Box::new(EarliestDueFirst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn candidate(id: i64, interval: f64, due: i64) -> ReviewCandidate {
        ReviewCandidate {
            id: CardId::new(id),
            interval,
            due,
            reps: 1,
        }
    }

    #[test]
    fn test_empty_candidates() {
        assert!(RandomSelection::with_seed(1).select(&[], 0).is_none());
        assert!(SmallestIntervalFirst.select(&[], 0).is_none());
        assert!(EarliestDueFirst.select(&[], 0).is_none());
    }

    #[test]
    fn test_random_selection_returns_member() {
        let candidates = vec![candidate(1, 0.0, 0), candidate(2, 1.0, 0), candidate(3, 2.0, 0)];
        let strategy = RandomSelection::with_seed(42);
        for _ in 0..50 {
            let id = strategy.select(&candidates, 0).unwrap();
            assert!(candidates.iter().any(|c| c.id == id));
        }
    }

    #[test]
    fn test_random_selection_reaches_every_card() {
        let candidates = vec![candidate(1, 0.0, 0), candidate(2, 1.0, 0), candidate(3, 2.0, 0)];
        let strategy = RandomSelection::with_seed(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(strategy.select(&candidates, 0).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_smallest_interval_first() {
        let candidates = vec![candidate(1, 4.0, 0), candidate(2, 0.1, 50), candidate(3, 0.1, 10)];
        assert_eq!(
            SmallestIntervalFirst.select(&candidates, 0),
            Some(CardId::new(3))
        );
    }

    #[test]
    fn test_earliest_due_first() {
        let candidates = vec![candidate(1, 4.0, 5), candidate(2, 0.1, 50), candidate(3, 8.0, 5)];
        assert_eq!(EarliestDueFirst.select(&candidates, 0), Some(CardId::new(1)));
    }

    #[test_case("random", Some(SelectionPolicy::Random))]
    #[test_case("smallest_interval", Some(SelectionPolicy::SmallestInterval))]
    #[test_case("Earliest-Due", Some(SelectionPolicy::EarliestDue))]
    #[test_case("fastest", None)]
    fn test_policy_parse(input: &str, expected: Option<SelectionPolicy>) {
        assert_eq!(SelectionPolicy::parse(input), expected);
        if let Some(policy) = expected {
            assert_eq!(policy.build().name(), policy.as_str());
        }
    }
}
