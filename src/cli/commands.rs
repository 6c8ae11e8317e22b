//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - simulate: run the engine against a simulated worker pool
//! - config: print the effective configuration
//! - breakers: print per-provider breaker settings

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Submitr - orchestration engine for directory listing submissions
#[derive(Parser, Debug)]
#[command(name = "submitr")]
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
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit directories and work them with simulated workers
    Simulate {
        /// Synthetic jobs to create when no targets file is given
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Concurrent simulated workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// JSON file listing directories to submit to
        #[arg(short, long)]
        targets: Option<PathBuf>,

        /// Seed for simulated outcomes
        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Print breaker settings for every provider
    Breakers,
}
