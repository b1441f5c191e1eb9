//! Default values for config.ini settings.
//!
//! Runtime defaults live next to the types they configure; this module maps
//! them onto the units used in the file.

use crate::cache::{
    DEFAULT_DISK_COUNT_LIMIT, DEFAULT_DISK_SIZE_LIMIT, DEFAULT_FLUSH_DELAY,
    DEFAULT_MEMORY_COST_LIMIT, DEFAULT_MEMORY_COUNT_LIMIT, DEFAULT_SWEEP_INITIAL_DELAY,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::pipeline::{
    DEFAULT_DECOMPRESS_CONCURRENCY, DEFAULT_DISK_IO_CONCURRENCY, DEFAULT_DOWNSAMPLE_CONCURRENCY,
    DEFAULT_ENCODE_CONCURRENCY, DEFAULT_ENCODE_QUALITY, DEFAULT_LOAD_CONCURRENCY,
};
use std::path::PathBuf;

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".thumbpipe";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "thumbpipe.log";

pub const DEFAULT_MEMORY_SIZE: u64 = DEFAULT_MEMORY_COST_LIMIT as u64;
pub const DEFAULT_MEMORY_COUNT: usize = DEFAULT_MEMORY_COUNT_LIMIT;
pub const DEFAULT_DISK_SIZE: u64 = DEFAULT_DISK_SIZE_LIMIT;
pub const DEFAULT_DISK_COUNT: usize = DEFAULT_DISK_COUNT_LIMIT;
pub const DEFAULT_FLUSH_DELAY_MS: u64 = DEFAULT_FLUSH_DELAY.as_millis() as u64;
pub const DEFAULT_SWEEP_INITIAL_DELAY_SECS: u64 = DEFAULT_SWEEP_INITIAL_DELAY.as_secs();
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = DEFAULT_SWEEP_INTERVAL.as_secs();

pub const DEFAULT_LOAD: usize = DEFAULT_LOAD_CONCURRENCY;
pub const DEFAULT_DISK_IO: usize = DEFAULT_DISK_IO_CONCURRENCY;
pub const DEFAULT_DOWNSAMPLE: usize = DEFAULT_DOWNSAMPLE_CONCURRENCY;
pub const DEFAULT_ENCODE: usize = DEFAULT_ENCODE_CONCURRENCY;
pub const DEFAULT_DECOMPRESS: usize = DEFAULT_DECOMPRESS_CONCURRENCY;
pub const DEFAULT_QUALITY: f32 = DEFAULT_ENCODE_QUALITY;

/// Upper bound accepted for any stage concurrency setting.
pub const MAX_STAGE_CONCURRENCY: usize = 64;

/// Get the path to the config directory (~/.thumbpipe).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the path to the config file (~/.thumbpipe/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Default disk cache directory (platform cache dir, e.g. ~/.cache/thumbpipe).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(config_directory)
        .join("thumbpipe")
}

/// Default log directory (~/.thumbpipe/logs).
pub fn default_log_directory() -> PathBuf {
    config_directory().join("logs")
}
