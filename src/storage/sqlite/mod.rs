//! `SQLite` deck storage.
//!
//! ## Module Structure
//!
//! - [`connection`]: lock acquisition, pragma configuration, transactions
//! - [`schema`]: the `cards` and `reviewHistory` tables
//! - [`metrics`]: shared metrics recording helpers
//! - `card_store` / `review_log`: the backend implementations
//!
//! All backends borrow the connection owned by a [`Deck`](crate::storage::Deck)
//! handle; none of them hold a connection of their own.

mod card_store;
pub mod connection;
pub mod metrics;
mod review_log;
pub mod schema;

pub use card_store::SqliteCardStore;
pub use connection::{
    BUSY_TIMEOUT_MS, acquire_lock, configure_connection, with_immediate_transaction,
};
pub use metrics::record_operation_metrics;
pub use review_log::SqliteReviewLog;
pub use schema::{SCHEMA_VERSION, initialize_schema};
