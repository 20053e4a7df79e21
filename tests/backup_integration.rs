//! `BackupManager` integration tests against a simulated filesystem.
//!
//! Tests the backup lifecycle in isolation:
//! - Dated snapshot creation and same-day idempotence
//! - Free-space refusal without creating a file
//! - Partial output cleanup after a failed copy
//! - Retention pruning across days
//! - Restore with quarantine of the replaced deck

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use cardsched::{
    BackupManager, BackupOutcome, BackupRecord, BackupSettings, Clock, ConnectionRegistry, Error,
    FileSystem, FixedClock, RestoreOutcome,
};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Helpers
// ============================================================================

/// In-memory filesystem with a configurable free-space figure and an
/// optional copy fault that leaves a truncated file behind.
#[derive(Default)]
struct SimulatedFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<HashSet<PathBuf>>,
    available: AtomicU64,
    fail_copy_after: Mutex<Option<usize>>,
}

impl SimulatedFs {
    fn new(available: u64) -> Self {
        let fs = Self::default();
        fs.available.store(available, Ordering::SeqCst);
        fs
    }

    fn put(&self, path: &Path, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_vec());
    }

    fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn fail_copies_after(&self, bytes: Option<usize>) {
        *self.fail_copy_after.lock().unwrap() = bytes;
    }

    fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

impl FileSystem for SimulatedFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock().unwrap();
        for ancestor in path.ancestors() {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.read(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let data = self
            .read(from)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let mut files = self.files.lock().unwrap();
        if files.contains_key(to) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        if let Some(limit) = *self.fail_copy_after.lock().unwrap() {
            files.insert(to.to_path_buf(), data[..limit.min(data.len())].to_vec());
            return Err(io::Error::other("device removed during copy"));
        }
        let len = data.len() as u64;
        files.insert(to.to_path_buf(), data);
        Ok(len)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let data = files
            .remove(from)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

const DECK: &str = "/decks/spanish.anki";
const DECK_BYTES: &[u8] = b"SQLite format 3\0spanish deck contents";

struct Harness {
    fs: Arc<SimulatedFs>,
    clock: Arc<FixedClock>,
    manager: BackupManager,
    registry: ConnectionRegistry,
}

fn harness(settings: BackupSettings) -> Harness {
    let fs = Arc::new(SimulatedFs::new(1 << 30));
    fs.put(Path::new(DECK), DECK_BYTES);
    let clock = Arc::new(FixedClock::at_date(
        NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
    ));
    let manager = BackupManager::new("/decks/backup", "/decks/broken")
        .with_settings(settings)
        .with_filesystem(Arc::clone(&fs) as Arc<dyn FileSystem>)
        .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
    Harness {
        fs,
        clock,
        manager,
        registry: ConnectionRegistry::new(),
    }
}

fn deck() -> &'static Path {
    Path::new(DECK)
}

// ============================================================================
// Backup Outcomes
// ============================================================================

#[test]
fn test_created_then_already_backed_up() {
    let h = harness(BackupSettings::default());

    let BackupOutcome::Created(record) = h.manager.backup_deck(&h.registry, deck()).unwrap() else {
        panic!("expected a new snapshot");
    };
    assert_eq!(
        record.path,
        PathBuf::from("/decks/backup/spanish-2024-02-28.anki")
    );
    assert_eq!(h.fs.read(&record.path).unwrap(), DECK_BYTES);

    // Later the same day, with the deck changed.
    h.clock.advance_millis(20 * 60 * 60 * 1000);
    h.fs.put(deck(), b"newer contents");
    for _ in 0..2 {
        let outcome = h.manager.backup_deck(&h.registry, deck()).unwrap();
        assert_eq!(outcome, BackupOutcome::AlreadyBackedUpToday(record.clone()));
    }
    assert_eq!(h.fs.read(&record.path).unwrap(), DECK_BYTES);
}

#[test]
fn test_new_day_creates_new_snapshot() {
    let h = harness(BackupSettings::default());
    h.manager.backup_deck(&h.registry, deck()).unwrap();
    h.clock.advance_days(1);

    let BackupOutcome::Created(record) = h.manager.backup_deck(&h.registry, deck()).unwrap() else {
        panic!("expected a snapshot for the next day");
    };
    assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert_eq!(h.manager.list_backups(deck()).unwrap().len(), 2);
}

#[test]
fn test_insufficient_space_creates_nothing() {
    let h = harness(BackupSettings::default());
    h.fs.available.store(10, Ordering::SeqCst);
    let files_before = h.fs.file_count();

    let outcome = h.manager.backup_deck(&h.registry, deck()).unwrap();
    assert_eq!(
        outcome,
        BackupOutcome::InsufficientSpace {
            required: DECK_BYTES.len() as u64,
            available: 10,
        }
    );
    assert_eq!(h.fs.file_count(), files_before);
    assert!(h.manager.list_backups(deck()).unwrap().is_empty());
    assert!(h.manager.backup_needed(deck()).unwrap());
}

#[test]
fn test_free_space_margin_is_required() {
    let h = harness(BackupSettings::default().with_min_free_space(1_000));
    let size = DECK_BYTES.len() as u64;
    h.fs.available.store(size + 999, Ordering::SeqCst);

    let outcome = h.manager.backup_deck(&h.registry, deck()).unwrap();
    assert!(matches!(
        outcome,
        BackupOutcome::InsufficientSpace { required, .. } if required == size + 1_000
    ));

    h.fs.available.store(size + 1_000, Ordering::SeqCst);
    assert!(matches!(
        h.manager.backup_deck(&h.registry, deck()).unwrap(),
        BackupOutcome::Created(_)
    ));
}

#[test]
fn test_failed_copy_leaves_no_partial_file() {
    let h = harness(BackupSettings::default());
    h.fs.fail_copies_after(Some(5));

    let result = h.manager.backup_deck(&h.registry, deck());
    let Err(Error::BackupFailed { path, .. }) = result else {
        panic!("expected BackupFailed, got {result:?}");
    };
    assert_eq!(path, PathBuf::from("/decks/backup/spanish-2024-02-28.anki"));
    assert!(h.fs.read(&path).is_none());
    assert!(h.manager.list_backups(deck()).unwrap().is_empty());

    // The next attempt succeeds once the fault clears.
    h.fs.fail_copies_after(None);
    assert!(matches!(
        h.manager.backup_deck(&h.registry, deck()).unwrap(),
        BackupOutcome::Created(_)
    ));
}

#[test]
fn test_retention_prunes_oldest() {
    let h = harness(BackupSettings::default().with_max_backups(3));
    for _ in 0..5 {
        h.manager.backup_deck(&h.registry, deck()).unwrap();
        h.clock.advance_days(1);
    }

    let names: Vec<String> = h
        .manager
        .list_backups(deck())
        .unwrap()
        .iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "spanish-2024-03-01.anki",
            "spanish-2024-03-02.anki",
            "spanish-2024-03-03.anki",
        ]
    );
}

#[test]
fn test_list_ignores_other_decks_and_foreign_files() {
    let h = harness(BackupSettings::default());
    h.fs.put(Path::new("/decks/backup/french-2024-01-01.anki"), b"x");
    h.fs.put(Path::new("/decks/backup/spanish-2023-12-31.anki"), b"x");
    h.fs.put(Path::new("/decks/backup/notes.txt"), b"x");
    h.manager.backup_deck(&h.registry, deck()).unwrap();

    let dates: Vec<NaiveDate> = h
        .manager
        .list_backups(deck())
        .unwrap()
        .iter()
        .map(|r| r.date)
        .collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
        ]
    );
}

// ============================================================================
// Restore
// ============================================================================

fn snapshot(h: &Harness) -> BackupRecord {
    let BackupOutcome::Created(record) = h.manager.backup_deck(&h.registry, deck()).unwrap() else {
        panic!("expected a new snapshot");
    };
    record
}

#[test]
fn test_restore_quarantines_with_unique_names() {
    let h = harness(BackupSettings::default());
    let record = snapshot(&h);
    let registry = ConnectionRegistry::new();

    h.fs.put(deck(), b"broken once");
    let first = h.manager.restore_backup(&registry, deck(), &record).unwrap();
    h.fs.put(deck(), b"broken twice");
    let second = h.manager.restore_backup(&registry, deck(), &record).unwrap();

    assert_eq!(
        first,
        RestoreOutcome::Restored {
            quarantined: Some(PathBuf::from("/decks/broken/spanish-corrupt-2024-02-28.anki")),
        }
    );
    assert_eq!(
        second,
        RestoreOutcome::Restored {
            quarantined: Some(PathBuf::from(
                "/decks/broken/spanish-corrupt-2024-02-28-1.anki"
            )),
        }
    );
    assert_eq!(h.fs.read(deck()).unwrap(), DECK_BYTES);
    assert_eq!(
        h.fs.read(Path::new("/decks/broken/spanish-corrupt-2024-02-28-1.anki"))
            .unwrap(),
        b"broken twice"
    );
}

#[test]
fn test_restore_missing_deck() {
    let h = harness(BackupSettings::default());
    let record = snapshot(&h);
    h.fs.remove_file(deck()).unwrap();

    let outcome = h
        .manager
        .restore_backup(&ConnectionRegistry::new(), deck(), &record)
        .unwrap();
    assert_eq!(outcome, RestoreOutcome::Restored { quarantined: None });
    assert_eq!(h.fs.read(deck()).unwrap(), DECK_BYTES);
}

#[test]
fn test_restore_insufficient_space() {
    let h = harness(BackupSettings::default());
    let record = snapshot(&h);
    h.fs.put(deck(), b"current");
    h.fs.available.store(1, Ordering::SeqCst);

    let outcome = h
        .manager
        .restore_backup(&ConnectionRegistry::new(), deck(), &record)
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::InsufficientSpace { .. }));
    assert_eq!(h.fs.read(deck()).unwrap(), b"current");
}

#[test]
fn test_failed_restore_puts_original_back() {
    let h = harness(BackupSettings::default());
    let record = snapshot(&h);
    h.fs.put(deck(), b"current");
    h.fs.fail_copies_after(Some(3));

    let result = h
        .manager
        .restore_backup(&ConnectionRegistry::new(), deck(), &record);
    assert!(matches!(result, Err(Error::BackupFailed { .. })));
    assert_eq!(h.fs.read(deck()).unwrap(), b"current");
    assert!(
        h.fs.read(Path::new("/decks/broken/spanish-corrupt-2024-02-28.anki"))
            .is_none()
    );
}
