//! CLI module for submitr - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
