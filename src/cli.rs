//! Command-line interface for Harbormaster
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Harbormaster - remote FreeBSD jail lifecycle manager
#[derive(Parser)]
#[command(name = "harbormaster")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "harbormaster.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a jail, creating and provisioning it first if needed
    Start {
        /// Jail name from the configuration
        jail: String,
    },

    /// Stop a running jail
    Stop {
        /// Jail name from the configuration
        jail: String,
    },

    /// Stop and destroy a jail
    Terminate {
        /// Jail name from the configuration
        jail: String,
    },

    /// Report jail status (all declared jails if none given)
    Status {
        /// Specific jail to report
        jail: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List jails known to the administrative tool
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run a one-shot command inside a running jail
    Console {
        /// Jail name from the configuration
        jail: String,

        /// Command to execute (use -- to separate from options)
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print the SSH host key fingerprint of a running jail
    Fingerprint {
        /// Jail name from the configuration
        jail: String,
    },

    /// Validate configuration
    Check,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "harbormaster", &mut std::io::stdout());
    }
}
