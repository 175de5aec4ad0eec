//! CLI interface for boardsync
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::TransportKind;

/// Boardsync
///
/// Extracts insights and risks from a source document and reconciles them
/// onto a collaboration board. Re-running with the same source only adds what
/// is missing.
#[derive(Parser, Debug)]
#[command(name = "boardsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile a source document onto a board (preview unless --execute)
    Sync {
        /// Target board id
        #[arg(long, value_name = "ID")]
        board: String,

        /// Source document to extract items from
        #[arg(long, value_name = "PATH")]
        source: PathBuf,

        /// Board transport
        #[arg(long, value_enum, default_value_t = TransportKind::Rest)]
        transport: TransportKind,

        /// Extraction model (overrides extraction.model)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Write to the board instead of previewing
        #[arg(long)]
        execute: bool,
    },

    /// Print the run identifier and marker for a source document
    Fingerprint {
        /// Source document
        path: PathBuf,
    },

    /// Show how stdio capabilities resolve against the tool catalog
    Capabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults_to_rest_preview() {
        let cli = Cli::try_parse_from([
            "boardsync", "sync", "--board", "uXjVK", "--source", "notes.md",
        ])
        .unwrap();
        match cli.command {
            Command::Sync {
                board,
                transport,
                execute,
                model,
                ..
            } => {
                assert_eq!(board, "uXjVK");
                assert_eq!(transport, TransportKind::Rest);
                assert!(!execute);
                assert!(model.is_none());
            }
            other => panic!("Expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "boardsync",
            "sync",
            "--board",
            "b",
            "--source",
            "s",
            "--transport",
            "stdio",
            "--execute",
            "--json",
            "--log",
            "debug",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Sync {
                transport: TransportKind::Stdio,
                execute: true,
                ..
            }
        ));
    }

    #[test]
    fn test_sync_requires_board() {
        assert!(Cli::try_parse_from(["boardsync", "sync", "--source", "s"]).is_err());
    }
}
