//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Use a simulated reader instead of the vendor driver
    #[arg(short, long)]
    pub simulate: bool,

    /// USB device index to open (overrides `reader.device_index`)
    #[arg(short, long, value_name = "N")]
    pub device: Option<u32>,
}

/// Tags command arguments.
#[derive(Debug, Args)]
pub struct TagsCommand {
    /// Show only the N most recently seen tags
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Decode command arguments.
#[derive(Debug, Args)]
pub struct DecodeCommand {
    /// Buffer bytes as hex, e.g. "0x05 0x01 0x01 0xAB 0x91" or "0501 01ab91"
    #[arg(required = true, num_args = 1..)]
    pub bytes: Vec<String>,

    /// Number of records the reader reported (defaults to all that parse)
    #[arg(short = 'n', long, value_name = "N")]
    pub count: Option<usize>,

    /// Byte length the reader reported (defaults to the whole dump)
    #[arg(short, long, value_name = "N")]
    pub length: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

impl DecodeCommand {
    /// All byte arguments joined into one dump.
    #[must_use]
    pub fn dump(&self) -> String {
        self.bytes.join(" ")
    }
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dump_joins_arguments() {
        let cmd = DecodeCommand {
            bytes: vec!["0x05".to_string(), "0x01".to_string(), "ab".to_string()],
            count: None,
            length: None,
            json: false,
        };
        assert_eq!(cmd.dump(), "0x05 0x01 ab");
    }

    #[test]
    fn test_watch_command_debug() {
        let cmd = WatchCommand {
            simulate: true,
            device: Some(1),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("simulate"));
        assert!(debug_str.contains("device"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
