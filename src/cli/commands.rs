//! CLI command definitions using clap.
//!
//! - run: start the watch daemon (default)
//! - check: resolve and evaluate every configured request once

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Slotwatch - watches a patient portal for appointment slots
#[derive(Parser, Debug)]
#[command(name = "slotwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Watch every configured request until interrupted
    Run,

    /// Evaluate every configured request once without booking or emailing
    Check {
        /// Only check requests for this service
        #[arg(short, long)]
        service: Option<String>,
    },
}
