//! Budget-triggered eviction over the disk cache directory.
//!
//! A sweep lists the cache directory, and only when the entry count or the
//! total size is over its limit, deletes files in order of least recent
//! access until both limits hold again. Within budget a sweep deletes
//! nothing.
//!
//! These functions block on filesystem calls and are only run from the disk
//! cache's I/O executor.

use crate::cache::path::is_temp_file;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

/// A file in the cache directory with the metadata eviction needs.
#[derive(Debug, Clone)]
pub(crate) struct CacheFile {
    pub(crate) path: PathBuf,
    pub(crate) accessed: SystemTime,
    pub(crate) size: u64,
}

/// Entry count and total size of the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub entry_count: usize,
    pub size_bytes: u64,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Number of files deleted
    pub files_deleted: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
    /// Usage before eviction
    pub before: DiskUsage,
    /// Usage after eviction
    pub after: DiskUsage,
    /// Duration of the sweep in milliseconds
    pub duration_ms: u64,
}

impl SweepResult {
    /// True if the sweep deleted anything.
    pub fn evicted(&self) -> bool {
        self.files_deleted > 0
    }
}

/// Collect cache files with their last-access time and size.
///
/// Leftover temporary files from interrupted writes are deleted on the way.
/// Filesystems without access times fall back to modification time.
pub(crate) fn collect_cache_files(dir: &Path) -> Vec<CacheFile> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(
                dir = %dir.display(),
                error = %e,
                "Failed to read directory during sweep scan"
            );
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if is_temp_file(&path) {
            let _ = std::fs::remove_file(&path);
            continue;
        }

        let accessed = metadata
            .accessed()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push(CacheFile {
            path,
            accessed,
            size: metadata.len(),
        });
    }
    files
}

/// Current usage of the cache directory.
pub(crate) fn scan_usage(dir: &Path) -> DiskUsage {
    usage_of(&collect_cache_files(dir))
}

fn usage_of(files: &[CacheFile]) -> DiskUsage {
    DiskUsage {
        entry_count: files.len(),
        size_bytes: files.iter().map(|f| f.size).sum(),
    }
}

/// Run one sweep against the given limits.
pub(crate) fn sweep_directory(dir: &Path, size_limit: u64, count_limit: usize) -> SweepResult {
    let start = Instant::now();
    let mut files = collect_cache_files(dir);
    let before = usage_of(&files);

    let within_budget =
        |usage: &DiskUsage| usage.entry_count <= count_limit && usage.size_bytes <= size_limit;

    if within_budget(&before) {
        debug!(
            entries = before.entry_count,
            size_bytes = before.size_bytes,
            count_limit,
            size_limit,
            "Disk cache within budget, no sweep needed"
        );
        return SweepResult {
            before,
            after: before,
            duration_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };
    }

    info!(
        entries = before.entry_count,
        size_bytes = before.size_bytes,
        count_limit,
        size_limit,
        "Disk cache over budget, starting sweep"
    );

    // Least recently accessed first
    files.sort_by_key(|f| f.accessed);

    let mut remaining = before;
    let mut files_deleted = 0usize;
    let mut bytes_freed = 0u64;

    for file in files {
        if within_budget(&remaining) {
            break;
        }

        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                files_deleted += 1;
                bytes_freed += file.size;
                remaining.entry_count -= 1;
                remaining.size_bytes = remaining.size_bytes.saturating_sub(file.size);
            }
            Err(e) => {
                debug!(
                    path = %file.path.display(),
                    error = %e,
                    "Failed to delete cache file during sweep"
                );
            }
        }
    }

    if !within_budget(&remaining) {
        warn!(
            entries = remaining.entry_count,
            size_bytes = remaining.size_bytes,
            "Sweep could not bring the disk cache within budget"
        );
    }

    SweepResult {
        files_deleted,
        bytes_freed,
        before,
        after: remaining,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Create a file with a given size and access time `age_secs` in the past.
    fn create_test_file(path: &Path, size: usize, age_secs: u64) {
        std::fs::write(path, vec![0u8; size]).unwrap();
        let atime = SystemTime::now() - Duration::from_secs(age_secs);
        filetime::set_file_atime(path, filetime::FileTime::from_system_time(atime)).unwrap();
    }

    #[test]
    fn test_collect_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(collect_cache_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_collect_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(collect_cache_files(&temp_dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_collect_skips_dirs_and_removes_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("nested")).unwrap();
        create_test_file(&root.join("aaa"), 10, 10);
        create_test_file(&root.join("bbb.tmp"), 10, 10);

        let files = collect_cache_files(root);
        assert_eq!(files.len(), 1);
        assert!(!root.join("bbb.tmp").exists());
    }

    #[test]
    fn test_within_budget_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(&root.join("a"), 100, 30);
        create_test_file(&root.join("b"), 100, 20);

        let result = sweep_directory(root, 1000, 10);

        assert!(!result.evicted());
        assert_eq!(result.before, result.after);
        assert!(root.join("a").exists());
        assert!(root.join("b").exists());
    }

    #[test]
    fn test_count_limit_evicts_least_recently_accessed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for i in 0..5u64 {
            // file0 is the oldest access, file4 the newest
            create_test_file(&root.join(format!("file{}", i)), 100, (5 - i) * 60);
        }

        let result = sweep_directory(root, u64::MAX, 3);

        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.after.entry_count, 3);
        assert!(!root.join("file0").exists());
        assert!(!root.join("file1").exists());
        assert!(root.join("file2").exists());
        assert!(root.join("file4").exists());
    }

    #[test]
    fn test_size_limit_stops_once_within_budget() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(&root.join("oldest"), 1000, 300);
        create_test_file(&root.join("middle"), 1000, 200);
        create_test_file(&root.join("newest"), 1000, 100);

        let result = sweep_directory(root, 2000, 100);

        assert_eq!(result.files_deleted, 1);
        assert_eq!(result.bytes_freed, 1000);
        assert_eq!(result.after.size_bytes, 2000);
        assert!(!root.join("oldest").exists());
        assert!(root.join("middle").exists());
        assert!(root.join("newest").exists());
    }

    #[test]
    fn test_both_limits_must_hold() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(&root.join("a"), 10, 400);
        create_test_file(&root.join("b"), 10, 300);
        create_test_file(&root.join("c"), 1000, 200);
        create_test_file(&root.join("d"), 10, 100);

        // Count allows 3, but size forces the large file out as well.
        let result = sweep_directory(root, 100, 3);

        assert_eq!(result.files_deleted, 3);
        assert_eq!(result.after.entry_count, 1);
        assert!(root.join("d").exists());
        assert!(result.after.size_bytes <= 100);
    }

    #[test]
    fn test_scan_usage() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(&root.join("a"), 10, 1);
        create_test_file(&root.join("b"), 20, 1);

        assert_eq!(
            scan_usage(root),
            DiskUsage {
                entry_count: 2,
                size_bytes: 30
            }
        );
    }
}
