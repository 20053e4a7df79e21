//! Storage backend traits.

mod card;
mod review_log;

pub use card::{CardStore, CardUpdate};
pub use review_log::ReviewLog;
