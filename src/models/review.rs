//! Review history records.

use super::{CardId, Ease};
use serde::{Deserialize, Serialize};

/// How a review entry came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReviewFlags {
    /// A regular answered review.
    #[default]
    Standard,
    /// The card was rescheduled out of band (cram, drill).
    Rescheduled,
}

impl ReviewFlags {
    /// Returns the stored code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Standard => 0,
            Self::Rescheduled => 1,
        }
    }

    /// Parses a stored code. Unknown codes are treated as rescheduled.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Standard,
            _ => Self::Rescheduled,
        }
    }
}

/// An immutable record of one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    /// Wall-clock time of the write (Unix epoch milliseconds).
    pub time: i64,
    /// Reviewed card.
    pub card_id: CardId,
    /// Grade given.
    pub ease: Ease,
    /// Repetition number after this review.
    pub rep: i64,
    /// Interval before the review, in days.
    pub last_interval: f64,
    /// Interval after the review, in days.
    pub interval: f64,
    /// Factor before the review.
    pub last_factor: f64,
    /// Factor after the review.
    pub factor: f64,
    /// Thinking time spent on the card, in milliseconds.
    pub user_time: i64,
    /// Days the card was overdue when answered.
    pub delay: f64,
    /// Successful answers after this review.
    pub yes_count: i64,
    /// Failed answers after this review.
    pub no_count: i64,
    /// Standard or rescheduled.
    pub flags: ReviewFlags,
}
