//! Command-line interface: argument parsing and output formatting.

pub mod commands;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
