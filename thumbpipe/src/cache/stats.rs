//! Cache statistics tracking and reporting.

use std::time::{Duration, Instant};

/// Memory cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size_bytes: usize,
    pub entry_count: usize,
}

impl MemoryStats {
    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

/// Disk cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub hits: u64,
    /// Hits answered from the staging record without touching the filesystem
    pub staged_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub flushes: u64,
    pub sweeps: u64,
}

impl DiskStats {
    /// Hit rate (0.0 to 1.0), counting staged hits as hits.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits + self.staged_hits, self.misses)
    }

    pub(crate) fn record_hit(&mut self, staged: bool) {
        if staged {
            self.staged_hits += 1;
        } else {
            self.hits += 1;
        }
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Snapshot of the cache tiers for reporting.
#[derive(Debug, Clone)]
pub struct CacheStatistics {
    /// `None` when the memory tier belongs to another process
    pub memory: Option<MemoryStats>,
    pub disk: DiskStats,
    /// Entries on disk at the time of the snapshot
    pub disk_entry_count: usize,
    /// Bytes on disk at the time of the snapshot
    pub disk_size_bytes: u64,
    pub uptime: Duration,
}

impl CacheStatistics {
    /// Build a snapshot from per-tier counters.
    pub fn new(
        memory: Option<MemoryStats>,
        disk: DiskStats,
        disk_entry_count: usize,
        disk_size_bytes: u64,
        started_at: Instant,
    ) -> Self {
        Self {
            memory,
            disk,
            disk_entry_count,
            disk_size_bytes,
            uptime: started_at.elapsed(),
        }
    }

    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        let mut out = String::from("Thumbnail Cache Statistics\n\n");
        if let Some(memory) = &self.memory {
            out.push_str(&format!(
                r#"MEMORY CACHE
  Entries:     {}
  Size:        {:.2} MB
  Hits:        {}
  Misses:      {}
  Hit Rate:    {:.1}%
  Evictions:   {}

"#,
                memory.entry_count,
                memory.size_bytes as f64 / (1024.0 * 1024.0),
                memory.hits,
                memory.misses,
                memory.hit_rate() * 100.0,
                memory.evictions,
            ));
        }
        out.push_str(&format!(
            r#"DISK CACHE
  Entries:     {}
  Size:        {:.2} MB
  Hits:        {} ({} staged)
  Misses:      {}
  Hit Rate:    {:.1}%
  Writes:      {}
  Failures:    {}
  Flushes:     {}
  Sweeps:      {}
  Evictions:   {}

Uptime:        {}s
"#,
            self.disk_entry_count,
            self.disk_size_bytes as f64 / (1024.0 * 1024.0),
            self.disk.hits + self.disk.staged_hits,
            self.disk.staged_hits,
            self.disk.misses,
            self.disk.hit_rate() * 100.0,
            self.disk.writes,
            self.disk.write_failures,
            self.disk.flushes,
            self.disk.sweeps,
            self.disk.evictions,
            self.uptime.as_secs(),
        ));
        out
    }
}
