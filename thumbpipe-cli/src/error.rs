//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;
use thumbpipe::cache::CacheError;
use thumbpipe::config::ConfigFileError;
use thumbpipe::pipeline::ThumbnailError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file could not be read, parsed or written
    Config(ConfigFileError),
    /// Disk cache could not be opened or stopped responding
    Cache(CacheError),
    /// One input file produced no thumbnail
    Thumbnail { path: PathBuf, error: ThumbnailError },
    /// Failed to write an output file
    FileWrite { path: PathBuf, error: std::io::Error },
    /// Some inputs failed; details were already reported
    Incomplete { failed: usize, total: usize },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigFileError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!("Run 'thumbpipe config show' to see the effective settings,");
            eprintln!("or 'thumbpipe config path' to locate the file.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::Thumbnail { path, error } => {
                write!(f, "No thumbnail for '{}': {}", path.display(), error)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
            CliError::Incomplete { failed, total } => {
                write!(f, "{} of {} thumbnails failed", failed, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::Thumbnail { error, .. } => Some(error),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Incomplete { .. } => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
