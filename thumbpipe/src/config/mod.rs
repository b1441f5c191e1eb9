//! User configuration loaded from `~/.thumbpipe/config.ini`.
//!
//! ```
//! use thumbpipe::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let parts = config.to_pipeline_parts();
//! assert_eq!(parts.pipeline.concurrency.encode, 1);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{
    config_directory, config_file_path, default_cache_directory, default_log_directory,
    DEFAULT_LOG_FILE, MAX_STAGE_CONCURRENCY,
};
pub use file::{ConfigFileError, PipelineParts};
pub use settings::{CacheSettings, ConfigFile, LoggingSettings, PipelineSettings};
pub use size::{format_size, parse_size, SizeParseError};
