//! Configuration management.
//!
//! Configuration is read from a TOML file. The first of these that applies
//! wins:
//!
//! 1. An explicit path (the `--config` flag)
//! 2. The `CARDSCHED_CONFIG_PATH` environment variable
//! 3. `<platform config dir>/cardsched/config.toml`
//! 4. Built-in defaults
//!
//! ```toml
//! deck_root = "/home/me/decks"
//! selection = "smallest-interval"
//!
//! [backup]
//! max_backups = 5
//!
//! [logging]
//! level = "cardsched=debug"
//! format = "json"
//! ```

mod settings;

pub use settings::{BackupSettings, ConfigFileBackup, ConfigFileLogging, LoggingSettings};

use crate::models::DECK_EXTENSION;
use crate::services::SelectionPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CARDSCHED_CONFIG_PATH";

/// Main configuration for cardsched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardschedConfig {
    /// Directory holding `.anki` deck files.
    pub deck_root: PathBuf,
    /// Directory holding dated snapshots.
    pub backup_dir: PathBuf,
    /// Directory receiving decks replaced by a restore.
    pub broken_dir: PathBuf,
    /// Review selection policy.
    pub selection: SelectionPolicy,
    /// Backup behavior.
    pub backup: BackupSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Deck directory.
    pub deck_root: Option<String>,
    /// Backup directory.
    pub backup_dir: Option<String>,
    /// Quarantine directory for replaced decks.
    pub broken_dir: Option<String>,
    /// Selection policy name.
    pub selection: Option<String>,
    /// Backup section.
    pub backup: Option<ConfigFileBackup>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

fn default_deck_root() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("decks"),
        |dirs| dirs.data_dir().join("cardsched").join("decks"),
    )
}

impl Default for CardschedConfig {
    fn default() -> Self {
        let deck_root = default_deck_root();
        Self {
            backup_dir: deck_root.join("backup"),
            broken_dir: deck_root.join("broken"),
            deck_root,
            selection: SelectionPolicy::default(),
            backup: BackupSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CardschedConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration, preferring `explicit` over the environment and
    /// the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file (argument or
    /// environment variable) cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Self::load_from_file(Path::new(&path));
        }
        Ok(Self::load_default())
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it names
    /// an unknown selection policy or log format.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or names an unknown
    /// selection policy or log format.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the platform config directory.
    ///
    /// Returns default configuration if no file is found or it is invalid.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs.config_dir().join("cardsched").join("config.toml");
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                Self::default()
            },
        }
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(deck_root) = file.deck_root {
            config = config.with_deck_root(deck_root);
        }
        if let Some(backup_dir) = file.backup_dir {
            config.backup_dir = PathBuf::from(backup_dir);
        }
        if let Some(broken_dir) = file.broken_dir {
            config.broken_dir = PathBuf::from(broken_dir);
        }
        if let Some(selection) = file.selection {
            config.selection = SelectionPolicy::parse(&selection).ok_or_else(|| {
                Error::InvalidInput(format!("unknown selection policy '{selection}'"))
            })?;
        }
        if let Some(backup) = file.backup {
            config.backup.merge(backup);
        }
        if let Some(logging) = file.logging {
            config.logging.merge(logging)?;
        }

        Ok(config)
    }

    /// Sets the deck directory and derives the backup and broken directories
    /// beneath it.
    #[must_use]
    pub fn with_deck_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.deck_root = path.into();
        self.backup_dir = self.deck_root.join("backup");
        self.broken_dir = self.deck_root.join("broken");
        self
    }

    /// Sets the selection policy.
    #[must_use]
    pub const fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    /// Resolves a deck argument to a file path.
    ///
    /// A bare name such as `spanish` maps to `<deck_root>/spanish.anki`;
    /// anything with a directory component or extension is used as given.
    #[must_use]
    pub fn deck_path(&self, deck: &str) -> PathBuf {
        let path = Path::new(deck);
        if path.components().count() > 1 || path.extension().is_some() {
            path.to_path_buf()
        } else {
            self.deck_root.join(format!("{deck}.{DECK_EXTENSION}"))
        }
    }
}
