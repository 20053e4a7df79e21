//! One connection per deck file.
//!
//! [`ConnectionRegistry`] maps a deck's path to the single open [`Deck`]
//! handle for it. Handles are created on first use and stay shared until
//! [`ConnectionRegistry::release`] closes them.
//!
//! # Concurrency Model
//!
//! One mutex guards the path map, and a new connection is opened while it is
//! held, so two threads acquiring the same unopened path always receive the
//! same handle. Each handle serializes its own statements behind a
//! `Mutex<Option<Connection>>`; the `Option` is emptied on release so stale
//! clones fail with [`Error::StorageUnavailable`] instead of reopening.

use crate::storage::sqlite::{acquire_lock, configure_connection, initialize_schema};
use crate::{Error, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;

struct DeckConnection {
    path: PathBuf,
    handle_id: u64,
    conn: Mutex<Option<Connection>>,
}

/// Shared handle to an open deck file.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Clone)]
pub struct Deck {
    inner: Arc<DeckConnection>,
}

impl fmt::Debug for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deck")
            .field("path", &self.inner.path)
            .field("handle_id", &self.inner.handle_id)
            .finish_non_exhaustive()
    }
}

impl Deck {
    fn from_connection(path: PathBuf, handle_id: u64, conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        initialize_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(DeckConnection {
                path,
                handle_id,
                conn: Mutex::new(Some(conn)),
            }),
        })
    }

    fn open(path: PathBuf, handle_id: u64) -> Result<Self> {
        let conn = Connection::open(&path).map_err(|e| Error::storage("open_deck", e))?;
        Self::from_connection(path, handle_id, conn)
    }

    /// Opens a private in-memory deck outside any registry (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if `SQLite` cannot be initialized.
    pub fn open_in_memory(name: &str) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::storage("open_deck_in_memory", e))?;
        initialize_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(DeckConnection {
                path: PathBuf::from(format!(":memory:{name}")),
                handle_id: 0,
                conn: Mutex::new(Some(conn)),
            }),
        })
    }

    /// Returns the deck file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the deck file name without extension.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner
            .path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned())
    }

    /// Returns the registry-assigned id of this handle.
    #[must_use]
    pub fn handle_id(&self) -> u64 {
        self.inner.handle_id
    }

    /// Returns true if both values refer to the same open handle.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        acquire_lock(&self.inner.conn).is_none()
    }

    /// Runs `f` with exclusive use of the deck connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the handle was released, or
    /// whatever `f` returns.
    pub fn with_connection<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let guard = acquire_lock(&self.inner.conn);
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::storage(operation, "deck connection has been released"))?;
        f(conn)
    }

    fn close(&self) {
        let conn = acquire_lock(&self.inner.conn).take();
        if let Some(conn) = conn
            && let Err((_conn, e)) = conn.close()
        {
            tracing::warn!(path = %self.inner.path.display(), error = %e, "deck close reported an error");
        }
    }
}

/// Registry of open deck connections keyed by normalized path.
///
/// Construct one per application context and call
/// [`release_all`](Self::release_all) at shutdown.
pub struct ConnectionRegistry {
    decks: Mutex<HashMap<PathBuf, Deck>>,
    next_handle_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decks: Mutex::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
        }
    }

    /// Returns the handle for `path`, opening the deck on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the deck cannot be opened or
    /// its schema cannot be created.
    #[instrument(skip(self, path), fields(deck.path = %path.as_ref().display()))]
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<Deck> {
        let key = normalize_path(path.as_ref());
        let mut decks = acquire_lock(&self.decks);
        if let Some(deck) = decks.get(&key) {
            return Ok(deck.clone());
        }

        let handle_id = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
        let deck = Deck::open(key.clone(), handle_id)?;
        tracing::info!(handle_id, "opened deck connection");
        metrics::gauge!("deck_connections_open").increment(1.0);
        decks.insert(key, deck.clone());
        Ok(deck)
    }

    /// Closes and forgets the handle for `path`.
    ///
    /// Returns false if no handle was registered.
    #[instrument(skip(self, path), fields(deck.path = %path.as_ref().display()))]
    pub fn release(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize_path(path.as_ref());
        let removed = acquire_lock(&self.decks).remove(&key);
        let Some(deck) = removed else {
            return false;
        };
        deck.close();
        tracing::info!(handle_id = deck.handle_id(), "released deck connection");
        metrics::gauge!("deck_connections_open").decrement(1.0);
        true
    }

    /// Closes every registered handle and returns how many were closed.
    pub fn release_all(&self) -> usize {
        let drained: Vec<Deck> = acquire_lock(&self.decks).drain().map(|(_, d)| d).collect();
        for deck in &drained {
            deck.close();
            metrics::gauge!("deck_connections_open").decrement(1.0);
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "released all deck connections");
        }
        drained.len()
    }

    /// Returns the registered handle for `path` without opening one.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Deck> {
        acquire_lock(&self.decks)
            .get(&normalize_path(path.as_ref()))
            .cloned()
    }

    /// Returns true if a handle for `path` is registered.
    #[must_use]
    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        acquire_lock(&self.decks).contains_key(&normalize_path(path.as_ref()))
    }

    /// Returns the number of registered handles.
    #[must_use]
    pub fn open_count(&self) -> usize {
        acquire_lock(&self.decks).len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Resolves `path` to the key used by the registry.
///
/// Existing files are canonicalized. For files not yet on disk the parent
/// directory is canonicalized instead, so a deck maps to the same key before
/// and after its file is created.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let (Some(parent), Some(name)) = (parent, path.file_name())
        && let Ok(parent) = parent.canonicalize()
    {
        return parent.join(name);
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
