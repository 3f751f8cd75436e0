//! CLI module for slotwatch - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
