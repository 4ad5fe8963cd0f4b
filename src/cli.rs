//! Command-line interface for narrator
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Narrated, subtitled product videos from record-store rows
#[derive(Parser, Debug)]
#[command(
    name = "narrator",
    version,
    about = "Narrated, subtitled product videos from record-store rows"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log filter implied by `-q` / `-v`, used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trigger endpoint and the worker pool
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Number of workers (overrides queue.workers)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Enqueue a merge after every successful speech generation
        #[arg(long)]
        chain_merge: bool,
    },

    /// Run a single task inline and print its report
    Run {
        #[command(subcommand)]
        task: RunTask,
    },

    /// Check external tools, the transcription model and credentials
    Check,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Task selection for `run`
#[derive(Subcommand, Debug)]
pub enum RunTask {
    /// Synthesize speech for a record and attach it
    Generate {
        /// Record id
        record_id: String,
    },
    /// Merge a record's audio into its video and attach the result
    Merge {
        /// Record id
        record_id: String,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
