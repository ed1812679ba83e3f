//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    AdvanceCommand, CancelCommand, HistoryCommand, RunCommand, StartCommand, StatusCommand,
    ValidateCommand,
};
use std::ffi::OsString;
use std::path::PathBuf;

/// Turn podcast audio into articles, social posts and edits
#[derive(Debug, Parser, Clone)]
#[command(name = "podcast-pipeline")]
#[command(version)]
#[command(about = "A resumable content pipeline for long-form audio", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline YAML file (defaults to the built-in podcast pipeline)
    #[arg(short, long, global = true)]
    pub pipeline: Option<PathBuf>,

    /// Directory holding resumable run state
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline on an audio file to completion
    Run(RunCommand),

    /// Create a resumable run without executing any step
    Start(StartCommand),

    /// Execute the next step of a resumable run
    Advance(AdvanceCommand),

    /// Show the state of a resumable run
    Status(StatusCommand),

    /// Cancel a resumable run before its next step
    Cancel(CancelCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Show saved run results
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
