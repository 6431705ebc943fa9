//! Unified error types for Harbormaster

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Harbormaster operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Jail '{0}' not defined in configuration")]
    UnknownJail(String),

    // Validation errors, detected before any remote call
    #[error("{0}")]
    Validation(String),

    #[error("Mount option '{0}' contains no equal sign.")]
    MountOption(String),

    // The tool's output contract changed or shows a state this design
    // does not model; never retried
    #[error("{0}")]
    Protocol(String),

    // Nonzero exit from the administrative tool
    #[error("{stderr}")]
    Tool { stderr: String },

    // Connection failure to the target host; same failure family as Tool
    // from the orchestrator's point of view
    #[error("Couldn't connect to instance [{host}]:\n{message}")]
    Transport { host: String, message: String },

    #[error("ZFS operation failed: {0}")]
    Zfs(String),

    // The current operation already logged its diagnostics; main exits
    // nonzero without printing anything further
    #[error("operation aborted")]
    Aborted,
}

/// Result type alias for Harbormaster operations
pub type Result<T> = std::result::Result<T, Error>;
