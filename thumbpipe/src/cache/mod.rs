//! Two-tier cache for encoded thumbnails.
//!
//! The memory tier is a bounded, volatile map. The disk tier persists one
//! file per key in a flat directory, stages its writes, and keeps itself
//! within budget with a periodic sweep.

mod disk;
mod key;
mod memory;
mod path;
mod staging;
mod stats;
mod sweep;
mod types;

use std::sync::Arc;

pub use disk::DiskCache;
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use path::{cache_path, key_to_filename};
pub use stats::{CacheStatistics, DiskStats, MemoryStats};
pub use sweep::{DiskUsage, SweepResult};
pub use types::{
    CacheError, DiskCacheConfig, MemoryCacheConfig, DEFAULT_DISK_COUNT_LIMIT,
    DEFAULT_DISK_SIZE_LIMIT, DEFAULT_FLUSH_DELAY, DEFAULT_MEMORY_COST_LIMIT,
    DEFAULT_MEMORY_COUNT_LIMIT, DEFAULT_SWEEP_INITIAL_DELAY, DEFAULT_SWEEP_INTERVAL,
};

/// Encoded thumbnail bytes shared between the cache tiers and callers.
pub type EncodedBytes = Arc<Vec<u8>>;
