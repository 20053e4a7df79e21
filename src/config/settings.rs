//! Backup and logging settings sections.

use crate::observability::LogFormat;
use serde::Deserialize;
use std::path::PathBuf;

/// Backup behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSettings {
    /// Whether `backup_deck` writes snapshots at all.
    pub enabled: bool,
    /// Snapshots kept per deck after pruning (0 keeps all).
    pub max_backups: usize,
    /// Free space that must remain after a copy, in bytes.
    pub min_free_space_bytes: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 3,
            min_free_space_bytes: 0,
        }
    }
}

impl BackupSettings {
    /// Returns settings with retention disabled.
    #[must_use]
    pub const fn keep_all(mut self) -> Self {
        self.max_backups = 0;
        self
    }

    /// Sets how many snapshots to keep per deck.
    #[must_use]
    pub const fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Sets the free-space margin kept after a copy.
    #[must_use]
    pub const fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space_bytes = bytes;
        self
    }
}

/// Logging output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `cardsched=debug`.
    pub level: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// `[backup]` section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileBackup {
    /// Enable backups.
    pub enabled: Option<bool>,
    /// Snapshots kept per deck.
    pub max_backups: Option<usize>,
    /// Free-space margin in bytes.
    pub min_free_space_bytes: Option<u64>,
}

/// `[logging]` section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl BackupSettings {
    pub(super) fn merge(&mut self, file: ConfigFileBackup) {
        if let Some(v) = file.enabled {
            self.enabled = v;
        }
        if let Some(v) = file.max_backups {
            self.max_backups = v;
        }
        if let Some(v) = file.min_free_space_bytes {
            self.min_free_space_bytes = v;
        }
    }
}

impl LoggingSettings {
    pub(super) fn merge(&mut self, file: ConfigFileLogging) -> crate::Result<()> {
        if let Some(level) = file.level {
            self.level = Some(level);
        }
        if let Some(format) = file.format {
            self.format = LogFormat::parse(&format).ok_or_else(|| {
                crate::Error::InvalidInput(format!("unknown log format '{format}'"))
            })?;
        }
        if let Some(path) = file.file {
            self.file = Some(PathBuf::from(path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_defaults() {
        let settings = BackupSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.max_backups, 3);
        assert_eq!(settings.min_free_space_bytes, 0);
        assert_eq!(settings.keep_all().max_backups, 0);
    }

    #[test]
    fn test_merge_partial_backup_section() {
        let mut settings = BackupSettings::default();
        settings.merge(ConfigFileBackup {
            max_backups: Some(7),
            ..Default::default()
        });
        assert!(settings.enabled);
        assert_eq!(settings.max_backups, 7);
    }

    #[test]
    fn test_merge_rejects_unknown_log_format() {
        let mut settings = LoggingSettings::default();
        let result = settings.merge(ConfigFileLogging {
            format: Some("xml".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
