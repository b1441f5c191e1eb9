//! Cache path construction and filename handling.
//!
//! Every disk entry lives directly in the cache directory under a name
//! derived from a SHA-256 digest of its cache key:
//!
//! ```text
//! <cache_dir>/<sha256(key) as lowercase hex>
//! ```
//!
//! There is no index file. The directory listing plus per-file metadata is
//! the only record of what the disk cache holds.

use crate::cache::CacheKey;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Extension used for in-progress writes before they are renamed into place.
pub const TEMP_EXTENSION: &str = "tmp";

/// Generate the on-disk file name for a cache key.
///
/// # Example
///
/// ```
/// use thumbpipe::cache::{key_to_filename, CacheKey};
///
/// let name = key_to_filename(&CacheKey::new("A"));
/// assert_eq!(name.len(), 64);
/// assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn key_to_filename(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Construct the full path for a cached entry.
pub fn cache_path(cache_dir: &Path, key: &CacheKey) -> PathBuf {
    cache_dir.join(key_to_filename(key))
}

/// Path used while an entry is being written.
pub(crate) fn temp_path(final_path: &Path) -> PathBuf {
    final_path.with_extension(TEMP_EXTENSION)
}

/// Returns true if the path is a leftover in-progress write.
pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
}
