//! Card types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Interval assigned to a card after a "forgotten" answer, in days.
pub const RELEARNING_INTERVAL: f64 = 0.1;

/// Difficulty factor assigned to newly created cards.
pub const DEFAULT_FACTOR: f64 = 2.5;

/// Unique identifier for a card.
///
/// Ids come from [`crate::IdGenerator`] and use the full signed 64-bit
/// range, matching the `INTEGER` column of the deck file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(i64);

impl CardId {
    /// Creates a card id from its raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CardId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Discrete grade stored in the review history.
///
/// Codes are shared with existing deck files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ease {
    /// No grade (out-of-band reschedules).
    None,
    /// The answer was not recalled.
    Failed,
    /// Recalled with difficulty.
    Hard,
    /// Recalled.
    Mid,
    /// Recalled easily.
    Easy,
}

impl Ease {
    /// Returns the stored code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Failed => 1,
            Self::Hard => 2,
            Self::Mid => 3,
            Self::Easy => 4,
        }
    }

    /// Parses a stored code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Failed),
            2 => Some(Self::Hard),
            3 => Some(Self::Mid),
            4 => Some(Self::Easy),
            _ => None,
        }
    }
}

/// Result of a single review as reported by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The card was recalled ("space").
    Remembered,
    /// The card was not recalled ("reset").
    Forgotten,
}

impl Outcome {
    /// Returns the outcome as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Remembered => "remembered",
            Self::Forgotten => "forgotten",
        }
    }

    /// Parses an outcome name, accepting the reviewer's key names as aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "remembered" | "space" | "yes" => Some(Self::Remembered),
            "forgotten" | "reset" | "no" => Some(Self::Forgotten),
            _ => None,
        }
    }

    /// Returns the ease code written to the review history.
    #[must_use]
    pub const fn ease(self) -> Ease {
        match self {
            Self::Remembered => Ease::Mid,
            Self::Forgotten => Ease::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a card in its review lifecycle, derived from its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    /// Never answered.
    New,
    /// First successful answer, interval of one day or less.
    Learning,
    /// Interval grown past one day.
    Review,
    /// Last answer was forgotten.
    Relearning,
}

impl CardState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reviewable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Unique identifier within the deck.
    pub id: CardId,
    /// Rendered question HTML.
    pub question: String,
    /// Rendered answer HTML.
    pub answer: String,
    /// Current spacing in days.
    pub interval: f64,
    /// Spacing before the last answer, in days.
    pub last_interval: f64,
    /// Difficulty multiplier.
    pub factor: f64,
    /// Factor before the last answer.
    pub last_factor: f64,
    /// Completed reviews.
    pub reps: i64,
    /// Cumulative successful answers.
    pub yes_count: i64,
    /// Cumulative failed answers.
    pub no_count: i64,
    /// When the card is next due (Unix epoch milliseconds).
    pub due: i64,
    /// Creation time (Unix epoch milliseconds).
    pub created: i64,
    /// Last modification time (Unix epoch milliseconds).
    pub modified: i64,
}

impl Card {
    /// Creates a new, never-reviewed card that is due immediately.
    #[must_use]
    pub fn new(
        id: CardId,
        question: impl Into<String>,
        answer: impl Into<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
            interval: 0.0,
            last_interval: 0.0,
            factor: DEFAULT_FACTOR,
            last_factor: DEFAULT_FACTOR,
            reps: 0,
            yes_count: 0,
            no_count: 0,
            due: now_millis,
            created: now_millis,
            modified: now_millis,
        }
    }

    /// Returns the lifecycle state implied by the current interval.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn state(&self) -> CardState {
        if self.interval == 0.0 {
            CardState::New
        } else if self.interval == RELEARNING_INTERVAL {
            CardState::Relearning
        } else if self.interval <= 1.0 {
            CardState::Learning
        } else {
            CardState::Review
        }
    }

    /// Returns how many days past due the card is at `now_millis`.
    ///
    /// Never-reviewed cards are never overdue.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overdue_days(&self, now_millis: i64) -> f64 {
        if self.reps == 0 {
            return 0.0;
        }
        ((now_millis - self.due).max(0) as f64) / MILLIS_PER_DAY
    }
}

/// Lightweight view of a card used by selection strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewCandidate {
    /// Card id.
    pub id: CardId,
    /// Current spacing in days.
    pub interval: f64,
    /// Next due time (Unix epoch milliseconds).
    pub due: i64,
    /// Completed reviews.
    pub reps: i64,
}

impl From<&Card> for ReviewCandidate {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            interval: card.interval,
            due: card.due,
            reps: card.reps,
        }
    }
}

/// Converts a spacing in days to milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn days_to_millis(days: f64) -> i64 {
    (days * MILLIS_PER_DAY).round() as i64
}
