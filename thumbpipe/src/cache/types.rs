//! Configuration and error types for the cache system.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default memory cache cost limit: 64 MB of encoded thumbnails.
pub const DEFAULT_MEMORY_COST_LIMIT: usize = 64 * 1024 * 1024;

/// Default memory cache entry limit.
pub const DEFAULT_MEMORY_COUNT_LIMIT: usize = 512;

/// Default disk cache size limit: 512 MB.
pub const DEFAULT_DISK_SIZE_LIMIT: u64 = 512 * 1024 * 1024;

/// Default disk cache entry limit.
pub const DEFAULT_DISK_COUNT_LIMIT: usize = 10_000;

/// Default batch window between a staged write and its flush.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(2);

/// Default delay before the first sweep after startup.
pub const DEFAULT_SWEEP_INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The disk I/O executor has stopped
    #[error("Disk cache executor is shut down")]
    ExecutorShutdown,

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Memory cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    /// Maximum total size of cached bytes
    pub cost_limit: usize,
    /// Maximum number of entries
    pub count_limit: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            cost_limit: DEFAULT_MEMORY_COST_LIMIT,
            count_limit: DEFAULT_MEMORY_COUNT_LIMIT,
        }
    }
}

impl MemoryCacheConfig {
    /// Set the total byte cost limit.
    pub fn with_cost_limit(mut self, bytes: usize) -> Self {
        self.cost_limit = bytes;
        self
    }

    /// Set the entry count limit.
    pub fn with_count_limit(mut self, count: usize) -> Self {
        self.count_limit = count;
        self
    }
}

/// Disk cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCacheConfig {
    /// Cache directory; one file per entry, no index
    pub directory: PathBuf,
    /// Maximum total size on disk in bytes
    pub size_limit: u64,
    /// Maximum number of files
    pub count_limit: usize,
    /// Batch window: staged changes are flushed this long after the first one
    pub flush_delay: Duration,
    /// Delay before the first sweep
    pub sweep_initial_delay: Duration,
    /// Interval between subsequent sweeps
    pub sweep_interval: Duration,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("thumbpipe");

        Self {
            directory,
            size_limit: DEFAULT_DISK_SIZE_LIMIT,
            count_limit: DEFAULT_DISK_COUNT_LIMIT,
            flush_delay: DEFAULT_FLUSH_DELAY,
            sweep_initial_delay: DEFAULT_SWEEP_INITIAL_DELAY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl DiskCacheConfig {
    /// Create a configuration rooted at the given directory with default limits.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Set the total size limit in bytes.
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes;
        self
    }

    /// Set the file count limit.
    pub fn with_count_limit(mut self, count: usize) -> Self {
        self.count_limit = count;
        self
    }

    /// Set the flush batch window.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Set the sweep schedule.
    pub fn with_sweep_schedule(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.sweep_initial_delay = initial_delay;
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        if self.directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
