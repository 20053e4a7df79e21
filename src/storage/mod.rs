//! Storage layer.
//!
//! Deck files are `SQLite` databases holding two tables:
//! - **cards**: the mutable scheduling state of every card
//! - **reviewHistory**: the append-only review log
//!
//! [`ConnectionRegistry`] owns the connections; [`CardStore`] and
//! [`ReviewLog`] implementations borrow them through a [`Deck`] handle.

// Dropping the connection guard at the end of each closure is intended.
#![allow(clippy::significant_drop_tightening)]

pub mod registry;
pub mod sqlite;
pub mod traits;

pub use registry::{ConnectionRegistry, Deck, normalize_path};
pub use sqlite::{SqliteCardStore, SqliteReviewLog, acquire_lock};
pub use traits::{CardStore, CardUpdate, ReviewLog};
