//! Binary entry point for cardsched.
//!
//! This binary provides the CLI interface over the scheduling engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use cardsched::config::CardschedConfig;
use cardsched::observability::{self, LoggingConfig};
use cardsched::{
    BackupManager, BackupOutcome, BackupRecord, CardId, ConnectionRegistry, Error, Outcome,
    RestoreOutcome, Scheduler,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Cardsched - spaced-repetition scheduling for flashcard decks.
#[derive(Parser)]
#[command(name = "cardsched")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Add a card to a deck.
    Add {
        /// Deck name or path.
        deck: String,
        /// Question side.
        question: String,
        /// Answer side.
        answer: String,
    },

    /// Show the next card to review.
    Next {
        /// Deck name or path.
        deck: String,
    },

    /// List every card in a deck with its review state.
    Cards {
        /// Deck name or path.
        deck: String,
    },

    /// Record an answer for a card.
    Answer {
        /// Deck name or path.
        deck: String,
        /// Card id.
        card_id: i64,
        /// `remembered` or `forgotten`.
        outcome: String,
        /// Time spent thinking, in milliseconds.
        #[arg(long, default_value = "0")]
        thinking_ms: i64,
    },

    /// Move a card to a new interval without counting a repetition.
    Reschedule {
        /// Deck name or path.
        deck: String,
        /// Card id.
        card_id: i64,
        /// New interval in days.
        interval: f64,
    },

    /// Print the review history of a deck.
    History {
        /// Deck name or path.
        deck: String,
        /// Only show entries for this card.
        #[arg(long)]
        card: Option<i64>,
    },

    /// Snapshot a deck into the backup directory.
    Backup {
        /// Deck name or path.
        deck: String,
    },

    /// List a deck's snapshots.
    Backups {
        /// Deck name or path.
        deck: String,
    },

    /// Replace a deck with one of its snapshots.
    Restore {
        /// Deck name or path.
        deck: String,
        /// Snapshot file name or path.
        backup: PathBuf,
    },

    /// Show the effective configuration.
    Config,
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CardschedConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability =
        match observability::init(LoggingConfig::from_settings(&config.logging, cli.verbose)) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        };

    let registry = ConnectionRegistry::new();
    let result = run_command(cli.command, &config, &registry);
    registry.release_all();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(
    command: Commands,
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Add {
            deck,
            question,
            answer,
        } => cmd_add(config, registry, &deck, &question, &answer),

        Commands::Next { deck } => cmd_next(config, registry, &deck),

        Commands::Cards { deck } => cmd_cards(config, registry, &deck),

        Commands::Answer {
            deck,
            card_id,
            outcome,
            thinking_ms,
        } => cmd_answer(config, registry, &deck, card_id, &outcome, thinking_ms),

        Commands::Reschedule {
            deck,
            card_id,
            interval,
        } => cmd_reschedule(config, registry, &deck, card_id, interval),

        Commands::History { deck, card } => cmd_history(config, registry, &deck, card),

        Commands::Backup { deck } => cmd_backup(config, registry, &deck),

        Commands::Backups { deck } => cmd_backups(config, &deck),

        Commands::Restore { deck, backup } => cmd_restore(config, registry, &deck, &backup),

        Commands::Config => cmd_config(config),
    }
}

fn scheduler(config: &CardschedConfig) -> Scheduler {
    Scheduler::sqlite().with_strategy(config.selection.build())
}

fn ensure_deck_root(config: &CardschedConfig, deck_path: &Path) -> Result<(), Error> {
    if let Some(parent) = deck_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_deck_root".to_string(),
            cause: format!("{}: {e}", config.deck_root.display()),
        })?;
    }
    Ok(())
}

/// Add command.
fn cmd_add(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
    question: &str,
    answer: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.deck_path(deck);
    ensure_deck_root(config, &path)?;
    let deck = registry.acquire(&path)?;
    let card = scheduler(config).add_card(&deck, question, answer)?;
    println!("Added card {}", card.id);
    Ok(())
}

/// Next command.
///
/// Takes the day's safety backup before the first review.
fn cmd_next(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.deck_path(deck);
    let backups = BackupManager::from_config(config);
    if backups.backup_needed(&path)? {
        match backups.backup_deck(registry, &path) {
            Ok(outcome) => tracing::debug!(?outcome, "safety backup"),
            Err(e) => eprintln!("Warning: safety backup failed: {e}"),
        }
    }

    let deck = registry.acquire(&path)?;
    let scheduler = scheduler(config);
    match scheduler.present_next(&deck) {
        Ok(card) => {
            println!(
                "Card {} ({}, interval {} days)",
                card.id,
                card.state(),
                card.interval
            );
            println!("Q: {}", card.question);
            println!("A: {}", card.answer);
            Ok(())
        },
        Err(Error::NoCardsAvailable) => {
            println!("No cards in deck '{}'", deck.name());
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

/// Cards command.
fn cmd_cards(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let deck = registry.acquire(config.deck_path(deck))?;
    let scheduler = scheduler(config);
    let cards = scheduler.store().list(&deck)?;
    if cards.is_empty() {
        println!("No cards in deck '{}'", deck.name());
        return Ok(());
    }
    println!(
        "{:<20} {:<10} {:>9} {:>4}  question",
        "card", "state", "interval", "rep"
    );
    for card in cards {
        println!(
            "{:<20} {:<10} {:>9.2} {:>4}  {}",
            card.id,
            card.state().as_str(),
            card.interval,
            card.reps,
            card.question
        );
    }
    Ok(())
}

/// Answer command.
fn cmd_answer(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
    card_id: i64,
    outcome: &str,
    thinking_ms: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = Outcome::parse(outcome)
        .ok_or_else(|| Error::InvalidInput(format!("unknown outcome '{outcome}'")))?;
    let deck = registry.acquire(config.deck_path(deck))?;
    let scheduler = scheduler(config);
    let card = scheduler.store().get(&deck, CardId::new(card_id))?;
    let card = scheduler.record_answer(&deck, &card, outcome, thinking_ms)?;
    println!(
        "Card {} {}: next interval {} days",
        card.id, outcome, card.interval
    );
    Ok(())
}

/// Reschedule command.
fn cmd_reschedule(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
    card_id: i64,
    interval: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let deck = registry.acquire(config.deck_path(deck))?;
    let card = scheduler(config).reschedule(&deck, CardId::new(card_id), interval)?;
    println!("Card {} rescheduled to {} days", card.id, card.interval);
    Ok(())
}

/// History command.
fn cmd_history(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
    card: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let deck = registry.acquire(config.deck_path(deck))?;
    let scheduler = scheduler(config);
    let entries = match card {
        Some(id) => scheduler.review_log().scan_card(&deck, CardId::new(id))?,
        None => scheduler.review_log().scan(&deck)?,
    };

    if entries.is_empty() {
        println!("No reviews recorded");
        return Ok(());
    }
    println!(
        "{:<14} {:<20} {:>4} {:>4} {:>9} {:>9} {:>8}",
        "time", "card", "ease", "rep", "last", "next", "think"
    );
    for entry in entries {
        println!(
            "{:<14} {:<20} {:>4} {:>4} {:>9.2} {:>9.2} {:>8}",
            entry.time,
            entry.card_id,
            entry.ease.code(),
            entry.rep,
            entry.last_interval,
            entry.interval,
            entry.user_time
        );
    }
    Ok(())
}

/// Backup command.
fn cmd_backup(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.deck_path(deck);
    match BackupManager::from_config(config).backup_deck(registry, &path)? {
        BackupOutcome::Created(record) => println!("Created {}", record.path.display()),
        BackupOutcome::AlreadyBackedUpToday(record) => {
            println!("Already backed up today: {}", record.path.display());
        },
        BackupOutcome::InsufficientSpace {
            required,
            available,
        } => println!("Not enough free space: need {required} bytes, have {available}"),
        BackupOutcome::Disabled => println!("Backups are disabled"),
    }
    Ok(())
}

/// Backups command.
fn cmd_backups(config: &CardschedConfig, deck: &str) -> Result<(), Box<dyn std::error::Error>> {
    let records = BackupManager::from_config(config).list_backups(&config.deck_path(deck))?;
    if records.is_empty() {
        println!("No backups");
    }
    for record in records {
        println!("{}  {}", record.date, record.path.display());
    }
    Ok(())
}

/// Restore command.
fn cmd_restore(
    config: &CardschedConfig,
    registry: &ConnectionRegistry,
    deck: &str,
    backup: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let backup = if backup.components().count() == 1 {
        config.backup_dir.join(backup)
    } else {
        backup.to_path_buf()
    };
    let record = BackupRecord::parse(&backup).ok_or_else(|| {
        Error::InvalidInput(format!("'{}' is not a deck snapshot", backup.display()))
    })?;

    let path = config.deck_path(deck);
    match BackupManager::from_config(config).restore_backup(registry, &path, &record)? {
        RestoreOutcome::Restored { quarantined } => {
            println!("Restored {} from {}", path.display(), record.path.display());
            if let Some(moved) = quarantined {
                println!("Previous deck moved to {}", moved.display());
            }
        },
        RestoreOutcome::InsufficientSpace {
            required,
            available,
        } => println!("Not enough free space: need {required} bytes, have {available}"),
    }
    Ok(())
}

/// Config command.
fn cmd_config(config: &CardschedConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("deck_root   = {}", config.deck_root.display());
    println!("backup_dir  = {}", config.backup_dir.display());
    println!("broken_dir  = {}", config.broken_dir.display());
    println!("selection   = {}", config.selection.as_str());
    println!(
        "backup      = enabled: {}, max_backups: {}, min_free_space_bytes: {}",
        config.backup.enabled, config.backup.max_backups, config.backup.min_free_space_bytes
    );
    println!(
        "logging     = level: {}, format: {:?}, file: {}",
        config.logging.level.as_deref().unwrap_or("(default)"),
        config.logging.format,
        config
            .logging
            .file
            .as_ref()
            .map_or_else(|| "(stderr)".to_string(), |p| p.display().to_string())
    );
    Ok(())
}
