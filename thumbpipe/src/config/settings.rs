//! Settings structs for each section of config.ini.
//!
//! Plain data; parsing lives in [`super::parser`] and serialization in
//! [`super::writer`].

use super::defaults::*;
use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    /// `[cache]`
    pub cache: CacheSettings,
    /// `[pipeline]`
    pub pipeline: PipelineSettings,
    /// `[logging]`
    pub logging: LoggingSettings,
}

/// Memory and disk cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Disk cache directory
    pub directory: PathBuf,
    /// Memory cache byte limit
    pub memory_size: u64,
    /// Memory cache entry limit
    pub memory_count: usize,
    /// Disk cache byte limit
    pub disk_size: u64,
    /// Disk cache file limit
    pub disk_count: usize,
    /// Batch window for staged disk writes
    pub flush_delay_ms: u64,
    /// Delay before the first sweep
    pub sweep_initial_delay_secs: u64,
    /// Interval between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            memory_size: DEFAULT_MEMORY_SIZE,
            memory_count: DEFAULT_MEMORY_COUNT,
            disk_size: DEFAULT_DISK_SIZE,
            disk_count: DEFAULT_DISK_COUNT,
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
            sweep_initial_delay_secs: DEFAULT_SWEEP_INITIAL_DELAY_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Stage pool sizes and encode quality.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub load: usize,
    pub disk_io: usize,
    pub downsample: usize,
    pub encode: usize,
    pub decompress: usize,
    /// Lossy encode quality, 0.0 to 1.0
    pub quality: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            load: DEFAULT_LOAD,
            disk_io: DEFAULT_DISK_IO,
            downsample: DEFAULT_DOWNSAMPLE,
            encode: DEFAULT_ENCODE,
            decompress: DEFAULT_DECOMPRESS,
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Log file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
