//! Shared connection handling for deck files.
//!
//! Lock acquisition with poison recovery, pragma configuration, and the
//! `BEGIN IMMEDIATE` transaction wrapper used by every write.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every deck connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
///
/// # Examples
///
/// ```ignore
/// use std::sync::Mutex;
/// use cardsched::storage::acquire_lock;
///
/// let mutex = Mutex::new(0);
/// *acquire_lock(&mutex) += 1;
/// ```
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            metrics::counter!("mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a deck connection.
///
/// # Configuration Applied
///
/// - **DELETE journal mode**: committed data always lives in the main file, so
///   a byte-for-byte copy of the deck is a complete snapshot
/// - **FULL synchronous**: commits are durable before `COMMIT` returns
/// - **`busy_timeout`**: waits up to [`BUSY_TIMEOUT_MS`] on lock contention
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a pragma cannot be applied.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row; read and discard it.
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))
        .map_err(|e| Error::storage("configure_journal_mode", e))?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(|e| Error::storage("configure_synchronous", e))?;
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| Error::storage("configure_busy_timeout", e))?;
    Ok(())
}

/// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` succeeds and rolls back otherwise. The error from `f` is
/// returned unchanged.
///
/// # Errors
///
/// Returns the error from `f`, or [`Error::StorageUnavailable`] if the
/// transaction cannot be started or committed.
pub fn with_immediate_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| Error::storage("begin_transaction", e))?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute_batch("COMMIT") {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "rollback after failed commit failed");
                }
                return Err(Error::storage("commit_transaction", e));
            }
            Ok(value)
        },
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        },
    }
}
