//! Dated deck snapshots.
//!
//! [`BackupManager`] keeps at most one snapshot per deck per calendar day in
//! the backup directory, named `<deck>-<YYYY-MM-DD>.anki`. Every filesystem
//! touch goes through [`FileSystem`] so free-space and copy failures can be
//! simulated.
//!
//! # Concurrency Model
//!
//! Each deck path maps to its own `Mutex<()>` in a lock map. Backup, prune,
//! and restore of one deck hold that lock for the whole check-then-copy
//! sequence; different decks proceed independently.
//!
//! Deck files use `DELETE` journaling, so a copy taken while no write
//! transaction is running is a complete database. Every write in this crate
//! runs under the deck handle's connection mutex, so when the deck is open in
//! the [`ConnectionRegistry`] the copy holds that mutex and no commit can be
//! in flight.

use crate::config::{BackupSettings, CardschedConfig};
use crate::models::{BackupOutcome, BackupRecord, DECK_EXTENSION, RestoreOutcome};
use crate::services::{Clock, SystemClock};
use crate::storage::{ConnectionRegistry, acquire_lock, normalize_path};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Filesystem operations used by backups.
pub trait FileSystem: Send + Sync {
    /// Returns true if `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Returns the size of the file at `path` in bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Returns the bytes available to this user on the volume holding `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn available_space(&self, path: &Path) -> io::Result<u64>;

    /// Copies `from` to a new file at `to`, returning the bytes written.
    ///
    /// Fails if `to` already exists. May leave a partial file at `to` on
    /// failure; callers clean up.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Moves `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Lists the entries of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }

    fn available_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut source = File::open(from)?;
        let mut target = OpenOptions::new().write(true).create_new(true).open(to)?;
        let written = io::copy(&mut source, &mut target)?;
        target.sync_all()?;
        Ok(written)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }
}

/// Creates, lists, prunes, and restores deck snapshots.
pub struct BackupManager {
    backup_dir: PathBuf,
    broken_dir: PathBuf,
    settings: BackupSettings,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl BackupManager {
    /// Creates a manager on the local filesystem and system clock.
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>, broken_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            broken_dir: broken_dir.into(),
            settings: BackupSettings::default(),
            fs: Arc::new(OsFileSystem),
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a manager from the configured directories and settings.
    #[must_use]
    pub fn from_config(config: &CardschedConfig) -> Self {
        Self::new(&config.backup_dir, &config.broken_dir).with_settings(config.backup)
    }

    /// Replaces the backup settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: BackupSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the filesystem.
    #[must_use]
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn deck_lock(&self, deck_path: &Path) -> Arc<Mutex<()>> {
        let mut locks = acquire_lock(&self.locks);
        Arc::clone(locks.entry(normalize_path(deck_path)).or_default())
    }

    /// Snapshots `deck_path` unless today's snapshot already exists.
    ///
    /// If `registry` holds an open handle for the deck, writers on that
    /// handle wait until the copy is done.
    ///
    /// # Outcomes
    ///
    /// - [`BackupOutcome::Created`] after a successful copy; older snapshots
    ///   beyond `max_backups` are then pruned
    /// - [`BackupOutcome::AlreadyBackedUpToday`] if today's file exists; it
    ///   is never overwritten
    /// - [`BackupOutcome::InsufficientSpace`] if the copy would not fit; no
    ///   file is created
    /// - [`BackupOutcome::Disabled`] if backups are turned off
    ///
    /// # Errors
    ///
    /// - [`Error::OperationFailed`] if the deck file is missing or the backup
    ///   directory cannot be created or inspected
    /// - [`Error::BackupFailed`] if the copy fails; any partial file has been
    ///   removed
    #[instrument(skip(self, registry, deck_path), fields(operation = "backup_deck", deck.path = %deck_path.display()))]
    pub fn backup_deck(
        &self,
        registry: &ConnectionRegistry,
        deck_path: &Path,
    ) -> Result<BackupOutcome> {
        if !self.settings.enabled {
            return Ok(BackupOutcome::Disabled);
        }

        let lock = self.deck_lock(deck_path);
        let _guard = acquire_lock(&lock);

        let deck_name = deck_name(deck_path)?;
        let size = self
            .fs
            .file_size(deck_path)
            .map_err(|e| io_failure("read_deck_size", deck_path, &e))?;
        self.fs
            .create_dir_all(&self.backup_dir)
            .map_err(|e| io_failure("create_backup_dir", &self.backup_dir, &e))?;

        let record = BackupRecord::new(&self.backup_dir, &deck_name, self.clock.today());
        if self.fs.exists(&record.path) {
            tracing::debug!(path = %record.path.display(), "deck already backed up today");
            return Ok(BackupOutcome::AlreadyBackedUpToday(record));
        }

        let required = size.saturating_add(self.settings.min_free_space_bytes);
        let available = self
            .fs
            .available_space(&self.backup_dir)
            .map_err(|e| io_failure("query_free_space", &self.backup_dir, &e))?;
        if available < required {
            tracing::warn!(required, available, "not enough free space for backup");
            metrics::counter!("backups_total", "status" => "insufficient_space").increment(1);
            return Ok(BackupOutcome::InsufficientSpace {
                required,
                available,
            });
        }

        self.snapshot(registry, deck_path, &record.path)?;
        tracing::info!(path = %record.path.display(), bytes = size, "created deck backup");
        metrics::counter!("backups_total", "status" => "created").increment(1);

        if let Err(e) = self.prune_locked(deck_path, &deck_name) {
            tracing::warn!(error = %e, "failed to prune old backups");
        }
        Ok(BackupOutcome::Created(record))
    }

    /// Returns true if the deck exists and has no snapshot for today.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the deck path has no file name.
    pub fn backup_needed(&self, deck_path: &Path) -> Result<bool> {
        if !self.settings.enabled || !self.fs.exists(deck_path) {
            return Ok(false);
        }
        let record = BackupRecord::new(&self.backup_dir, &deck_name(deck_path)?, self.clock.today());
        Ok(!self.fs.exists(&record.path))
    }

    /// Returns the deck's snapshots, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the backup directory exists but
    /// cannot be listed.
    pub fn list_backups(&self, deck_path: &Path) -> Result<Vec<BackupRecord>> {
        self.list_for(&deck_name(deck_path)?)
    }

    fn list_for(&self, deck_name: &str) -> Result<Vec<BackupRecord>> {
        if !self.fs.exists(&self.backup_dir) {
            return Ok(Vec::new());
        }
        let entries = self
            .fs
            .list_dir(&self.backup_dir)
            .map_err(|e| io_failure("list_backups", &self.backup_dir, &e))?;
        let mut records: Vec<BackupRecord> = entries
            .iter()
            .filter_map(|path| BackupRecord::parse(path))
            .filter(|record| record.deck_name == deck_name)
            .collect();
        records.sort();
        Ok(records)
    }

    /// Removes the oldest snapshots beyond `max_backups` and returns them.
    ///
    /// Does nothing when `max_backups` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if listing or removal fails.
    pub fn prune(&self, deck_path: &Path) -> Result<Vec<BackupRecord>> {
        let lock = self.deck_lock(deck_path);
        let _guard = acquire_lock(&lock);
        self.prune_locked(deck_path, &deck_name(deck_path)?)
    }

    fn prune_locked(&self, deck_path: &Path, deck_name: &str) -> Result<Vec<BackupRecord>> {
        let keep = self.settings.max_backups;
        if keep == 0 {
            return Ok(Vec::new());
        }
        let mut records = self.list_for(deck_name)?;
        if records.len() <= keep {
            return Ok(Vec::new());
        }
        let excess = records.len() - keep;
        let removed: Vec<BackupRecord> = records.drain(..excess).collect();
        for record in &removed {
            self.fs
                .remove_file(&record.path)
                .map_err(|e| io_failure("remove_backup", &record.path, &e))?;
        }
        tracing::info!(
            deck.path = %deck_path.display(),
            removed = removed.len(),
            "pruned old backups"
        );
        Ok(removed)
    }

    /// Replaces the deck file with a snapshot.
    ///
    /// The current deck file, if any, is moved to the broken directory as
    /// `<deck>-corrupt-<date>[-n].anki`. If the copy fails, the partial file
    /// is removed and the original deck is moved back.
    ///
    /// # Errors
    ///
    /// - [`Error::DeckInUse`] if `registry` holds a connection for the deck
    /// - [`Error::OperationFailed`] if the snapshot is missing or the deck
    ///   cannot be moved aside
    /// - [`Error::BackupFailed`] if the copy fails
    #[instrument(skip(self, registry, deck_path, record), fields(operation = "restore_backup", deck.path = %deck_path.display(), backup.path = %record.path.display()))]
    pub fn restore_backup(
        &self,
        registry: &ConnectionRegistry,
        deck_path: &Path,
        record: &BackupRecord,
    ) -> Result<RestoreOutcome> {
        let lock = self.deck_lock(deck_path);
        let _guard = acquire_lock(&lock);

        if registry.is_open(deck_path) {
            return Err(Error::DeckInUse(deck_path.to_path_buf()));
        }

        let required = self
            .fs
            .file_size(&record.path)
            .map_err(|e| io_failure("read_backup_size", &record.path, &e))?;
        let deck_dir = deck_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let available = self
            .fs
            .available_space(deck_dir)
            .map_err(|e| io_failure("query_free_space", deck_dir, &e))?;
        if available < required {
            tracing::warn!(required, available, "not enough free space for restore");
            return Ok(RestoreOutcome::InsufficientSpace {
                required,
                available,
            });
        }

        let quarantined = if self.fs.exists(deck_path) {
            Some(self.quarantine(deck_path)?)
        } else {
            None
        };

        if let Err(e) = self.copy_or_clean(&record.path, deck_path) {
            if let Some(moved) = &quarantined
                && let Err(undo) = self.fs.rename(moved, deck_path)
            {
                tracing::error!(
                    path = %moved.display(),
                    error = %undo,
                    "failed to move original deck back after restore failure"
                );
            }
            return Err(e);
        }

        tracing::info!("restored deck from backup");
        Ok(RestoreOutcome::Restored { quarantined })
    }

    fn quarantine(&self, deck_path: &Path) -> Result<PathBuf> {
        self.fs
            .create_dir_all(&self.broken_dir)
            .map_err(|e| io_failure("create_broken_dir", &self.broken_dir, &e))?;

        let stem = format!("{}-corrupt-{}", deck_name(deck_path)?, self.clock.today());
        let target = (0u32..)
            .map(|n| {
                let name = if n == 0 {
                    format!("{stem}.{DECK_EXTENSION}")
                } else {
                    format!("{stem}-{n}.{DECK_EXTENSION}")
                };
                self.broken_dir.join(name)
            })
            .find(|candidate| !self.fs.exists(candidate))
            .ok_or_else(|| Error::OperationFailed {
                operation: "quarantine_deck".to_string(),
                cause: "no free quarantine file name".to_string(),
            })?;

        self.fs
            .rename(deck_path, &target)
            .map_err(|e| io_failure("quarantine_deck", deck_path, &e))?;
        tracing::info!(path = %target.display(), "moved replaced deck aside");
        Ok(target)
    }

    fn snapshot(
        &self,
        registry: &ConnectionRegistry,
        deck_path: &Path,
        target: &Path,
    ) -> Result<()> {
        if let Some(deck) = registry.get(deck_path)
            && let Ok(copied) = deck.with_connection("snapshot_deck", |_conn| {
                Ok(self.copy_or_clean(deck_path, target))
            })
        {
            return copied;
        }
        // Not open here, or released since the lookup.
        self.copy_or_clean(deck_path, target)
    }

    fn copy_or_clean(&self, from: &Path, to: &Path) -> Result<()> {
        match self.fs.copy(from, to) {
            Ok(_) => Ok(()),
            Err(e) => {
                if self.fs.exists(to)
                    && let Err(cleanup) = self.fs.remove_file(to)
                {
                    tracing::error!(path = %to.display(), error = %cleanup, "failed to remove partial copy");
                }
                metrics::counter!("backups_total", "status" => "failed").increment(1);
                Err(Error::BackupFailed {
                    path: to.to_path_buf(),
                    cause: e.to_string(),
                })
            },
        }
    }
}

fn deck_name(deck_path: &Path) -> Result<String> {
    deck_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::OperationFailed {
            operation: "resolve_deck_name".to_string(),
            cause: format!("'{}' has no file name", deck_path.display()),
        })
}

fn io_failure(operation: &str, path: &Path, e: &io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FixedClock;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        registry: ConnectionRegistry,
        _dir: tempfile::TempDir,
        deck: PathBuf,
        clock: Arc<FixedClock>,
        manager: BackupManager,
    }

    fn fixture(settings: BackupSettings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("spanish.anki");
        fs::write(&deck, b"deck bytes").unwrap();
        let clock = Arc::new(FixedClock::at_date(date(2024, 5, 1)));
        let manager = BackupManager::new(dir.path().join("backup"), dir.path().join("broken"))
            .with_settings(settings)
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        Fixture {
            registry: ConnectionRegistry::new(),
            _dir: dir,
            deck,
            clock,
            manager,
        }
    }

    #[test]
    fn test_backup_creates_dated_copy() {
        let f = fixture(BackupSettings::default());
        let outcome = f.manager.backup_deck(&f.registry, &f.deck).unwrap();
        let BackupOutcome::Created(record) = outcome else {
            unreachable!("expected a new backup, got {outcome:?}");
        };
        assert_eq!(
            record.path.file_name().unwrap().to_str().unwrap(),
            "spanish-2024-05-01.anki"
        );
        assert_eq!(fs::read(&record.path).unwrap(), b"deck bytes");
    }

    #[test]
    fn test_second_backup_same_day_is_noop() {
        let f = fixture(BackupSettings::default());
        f.manager.backup_deck(&f.registry, &f.deck).unwrap();
        fs::write(&f.deck, b"changed").unwrap();

        let outcome = f.manager.backup_deck(&f.registry, &f.deck).unwrap();
        assert!(matches!(outcome, BackupOutcome::AlreadyBackedUpToday(_)));
        let outcome = f.manager.backup_deck(&f.registry, &f.deck).unwrap();
        assert!(matches!(outcome, BackupOutcome::AlreadyBackedUpToday(_)));

        let records = f.manager.list_backups(&f.deck).unwrap();
        assert_eq!(fs::read(&records[0].path).unwrap(), b"deck bytes");
    }

    #[test]
    fn test_retention_keeps_newest() {
        let f = fixture(BackupSettings::default().with_max_backups(2));
        for _ in 0..4 {
            f.manager.backup_deck(&f.registry, &f.deck).unwrap();
            f.clock.advance_days(1);
        }
        let dates: Vec<NaiveDate> = f
            .manager
            .list_backups(&f.deck)
            .unwrap()
            .iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(dates, vec![date(2024, 5, 3), date(2024, 5, 4)]);
    }

    #[test]
    fn test_backup_needed() {
        let f = fixture(BackupSettings::default());
        assert!(f.manager.backup_needed(&f.deck).unwrap());
        f.manager.backup_deck(&f.registry, &f.deck).unwrap();
        assert!(!f.manager.backup_needed(&f.deck).unwrap());
        f.clock.advance_days(1);
        assert!(f.manager.backup_needed(&f.deck).unwrap());
    }

    #[test]
    fn test_disabled() {
        let settings = BackupSettings {
            enabled: false,
            ..BackupSettings::default()
        };
        let f = fixture(settings);
        assert_eq!(
            f.manager.backup_deck(&f.registry, &f.deck).unwrap(),
            BackupOutcome::Disabled
        );
        assert!(!f.manager.backup_needed(&f.deck).unwrap());
    }

    #[test]
    fn test_missing_deck_is_operation_failed() {
        let f = fixture(BackupSettings::default());
        let result = f
            .manager
            .backup_deck(&f.registry, &f.deck.with_file_name("missing.anki"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_restore_quarantines_current_deck() {
        let f = fixture(BackupSettings::default());
        let BackupOutcome::Created(record) = f.manager.backup_deck(&f.registry, &f.deck).unwrap()
        else {
            unreachable!("expected a new backup");
        };
        fs::write(&f.deck, b"corrupted").unwrap();

        let outcome = f.manager.restore_backup(&f.registry, &f.deck, &record).unwrap();
        let RestoreOutcome::Restored {
            quarantined: Some(moved),
        } = outcome
        else {
            unreachable!("expected a restore with quarantine, got {outcome:?}");
        };
        assert_eq!(
            moved.file_name().unwrap().to_str().unwrap(),
            "spanish-corrupt-2024-05-01.anki"
        );
        assert_eq!(fs::read(&moved).unwrap(), b"corrupted");
        assert_eq!(fs::read(&f.deck).unwrap(), b"deck bytes");
    }

    #[test]
    fn test_restore_refuses_open_deck() {
        let f = fixture(BackupSettings::default());
        let BackupOutcome::Created(record) = f.manager.backup_deck(&f.registry, &f.deck).unwrap()
        else {
            unreachable!("expected a new backup");
        };
        fs::remove_file(&f.deck).unwrap();

        let _deck = f.registry.acquire(&f.deck).unwrap();
        let result = f.manager.restore_backup(&f.registry, &f.deck, &record);
        assert!(matches!(result, Err(Error::DeckInUse(_))));
    }

    #[test]
    fn test_backup_of_open_deck_is_readable() {
        use crate::models::{Card, CardId};
        use crate::storage::{CardStore, SqliteCardStore};

        let f = fixture(BackupSettings::default());
        let live = f.deck.with_file_name("live.anki");
        let deck = f.registry.acquire(&live).unwrap();
        SqliteCardStore::new()
            .insert(&deck, &Card::new(CardId::new(1), "q", "a", 0))
            .unwrap();

        let BackupOutcome::Created(record) = f.manager.backup_deck(&f.registry, &live).unwrap()
        else {
            unreachable!("expected a new backup");
        };
        // The handle stays usable after the copy.
        assert_eq!(SqliteCardStore::new().count(&deck).unwrap(), 1);

        let snapshot = rusqlite::Connection::open(&record.path).unwrap();
        let cards: i64 = snapshot
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cards, 1);
    }
}
