//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keyplane - declarative identity and access reconciliation.
#[derive(Parser, Debug)]
#[command(name = "keyplane")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the accounts configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "KEYPLANE_CONFIG",
        default_value = "keyplane.yaml"
    )]
    pub config: PathBuf,

    /// Template repository directory.
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "KEYPLANE_REPO_DIR",
        default_value = "."
    )]
    pub repo_dir: PathBuf,

    /// Path to the local provider snapshot file.
    #[arg(
        long,
        global = true,
        env = "KEYPLANE_STATE",
        default_value = "keyplane.state.json"
    )]
    pub state: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate every template in the repository.
    Validate,

    /// Compute and display proposed changes without applying them.
    Plan {
        /// Where to write the change report.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Apply templates to the configured providers.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Where to write the change report.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check for drift between templates and live state.
    Detect,

    /// Generate or refresh templates from live provider state.
    Import,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
