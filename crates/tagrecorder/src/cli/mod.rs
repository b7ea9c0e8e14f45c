//! Command-line interface for tagrecorder.
//!
//! This module provides the CLI structure and command handlers for the
//! `tagrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ClearCommand, ConfigCommand, DecodeCommand, StatusCommand, TagsCommand, WatchCommand,
};

/// tagrec - Record every tag a USB RFID reader sees
///
/// Polls the reader, keeps a history of distinct tags in a local database
/// and shows new and returning tags live in the terminal.
#[derive(Debug, Parser)]
#[command(name = "tagrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the reader and show tags live until Ctrl-C
    Watch(WatchCommand),

    /// List recorded tags, most recently seen first
    Tags(TagsCommand),

    /// Show database and driver status
    Status(StatusCommand),

    /// Print the number of attached USB readers
    Devices,

    /// Delete all recorded tags
    Clear(ClearCommand),

    /// Decode a raw tag buffer dump
    Decode(DecodeCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
