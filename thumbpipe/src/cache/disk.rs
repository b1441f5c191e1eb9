//! Persistent disk cache with staged writes.
//!
//! Writes and removals are recorded in a staging record and applied later
//! in batches by a single I/O executor task, which also owns the periodic
//! sweep and access-time refreshes. All filesystem mutation goes through
//! that one task, so a flush and a sweep never race each other.
//!
//! Reads consult the staging record before the filesystem. A value stored
//! a moment ago is visible to `get` immediately, including while its batch
//! is being written.
//!
//! # Lifecycle
//!
//! ```text
//! store(k, v) ──► pending batch ──(flush delay)──► in-flight batch ──► files
//!                      ▲                                   │
//!          get(k) ─────┴──────── lookup order ─────────────┴──► read file
//! ```
//!
//! Filesystem errors during a flush or sweep are logged and counted, never
//! surfaced to callers. A failed write is simply a future miss.

use crate::cache::path::{cache_path, temp_path};
use crate::cache::staging::{StagedBatch, StagedChange, StagedLookup, StagingRecord};
use crate::cache::sweep::{scan_usage, sweep_directory, DiskUsage, SweepResult};
use crate::cache::types::{CacheError, DiskCacheConfig};
use crate::cache::{CacheKey, DiskStats, EncodedBytes};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work items for the I/O executor.
enum Command {
    /// Start the batch window if it is not already running
    ScheduleFlush,
    /// Flush now and acknowledge
    Flush(oneshot::Sender<()>),
    /// Sweep now and report
    Sweep(oneshot::Sender<SweepResult>),
    /// Refresh the access time of a file that was just read
    Touch(PathBuf),
    /// Report current usage
    Usage(oneshot::Sender<DiskUsage>),
}

/// State shared between the cache handle and its executor.
struct DiskInner {
    config: DiskCacheConfig,
    staging: Mutex<StagingRecord>,
    stats: Mutex<DiskStats>,
}

/// Outcome of applying one batch.
#[derive(Debug, Default)]
struct BatchOutcome {
    writes: u64,
    removals: u64,
    failures: u64,
}

/// Disk cache for encoded thumbnails.
///
/// Must be opened inside a Tokio runtime. Dropping the cache stops the
/// executor after a final flush; call [`DiskCache::shutdown`] to wait for it.
pub struct DiskCache {
    inner: Arc<DiskInner>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    executor: Mutex<Option<JoinHandle<()>>>,
}

impl DiskCache {
    /// Open the cache directory, creating it if needed, and start the executor.
    pub async fn open(config: DiskCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.directory).await?;

        info!(
            directory = %config.directory.display(),
            size_limit = config.size_limit,
            count_limit = config.count_limit,
            flush_delay_ms = config.flush_delay.as_millis() as u64,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Disk cache opened"
        );

        let inner = Arc::new(DiskInner {
            config,
            staging: Mutex::new(StagingRecord::default()),
            stats: Mutex::new(DiskStats::default()),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let executor = tokio::spawn(run_executor(
            Arc::clone(&inner),
            rx,
            shutdown.clone(),
        ));

        Ok(Self {
            inner,
            commands: tx,
            shutdown,
            executor: Mutex::new(Some(executor)),
        })
    }

    /// Look up a key, consulting staged changes before the filesystem.
    ///
    /// A hit on disk refreshes the file's access time so the sweep treats
    /// it as recently used.
    pub async fn get(&self, key: &CacheKey) -> Option<EncodedBytes> {
        let staged = self.inner.staging.lock().lookup(key);
        match staged {
            StagedLookup::Present(bytes) => {
                self.inner.stats.lock().record_hit(true);
                return Some(bytes);
            }
            StagedLookup::Absent => {
                self.inner.stats.lock().misses += 1;
                return None;
            }
            StagedLookup::Unknown => {}
        }

        let path = cache_path(&self.inner.config.directory, key);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                self.inner.stats.lock().record_hit(false);
                let _ = self.commands.send(Command::Touch(path));
                Some(Arc::new(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.inner.stats.lock().misses += 1;
                None
            }
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "Disk cache read failed");
                self.inner.stats.lock().misses += 1;
                None
            }
        }
    }

    /// Stage bytes for a key. `None` stages a removal. Returns without
    /// touching the filesystem.
    pub fn store(&self, key: &CacheKey, bytes: Option<EncodedBytes>) {
        let Some(bytes) = bytes else {
            self.remove(key);
            return;
        };
        debug!(key = %key, size_bytes = bytes.len(), "Staging disk cache write");
        self.stage(|batch| batch.stage_add(key.clone(), bytes));
    }

    /// Stage removal of a key.
    pub fn remove(&self, key: &CacheKey) {
        self.stage(|batch| batch.stage_remove(key.clone()));
    }

    /// Stage removal of every entry.
    ///
    /// Changes staged before this call are discarded. Changes staged after
    /// it survive and are written once the directory has been cleared.
    pub fn remove_all(&self) {
        debug!("Staging disk cache clear");
        self.stage(StagedBatch::stage_clear_all);
    }

    /// Record a change and make sure a flush is scheduled.
    ///
    /// Refused once shutdown has begun; the final flush would not see it.
    fn stage(&self, change: impl FnOnce(&mut StagedBatch)) {
        let schedule = {
            let mut staging = self.inner.staging.lock();
            if self.shutdown.is_cancelled() {
                drop(staging);
                warn!(
                    directory = %self.inner.config.directory.display(),
                    "Disk cache is shut down, change dropped"
                );
                return;
            }
            change(&mut staging.pending);
            staging.request_flush()
        };
        if schedule && self.commands.send(Command::ScheduleFlush).is_err() {
            self.inner.staging.lock().flush_scheduled = false;
            warn!("Disk cache executor stopped, staged change will not be written");
        }
    }

    /// Apply all staged changes now and wait for them to land.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| CacheError::ExecutorShutdown)
    }

    /// Run a sweep now instead of waiting for the next scheduled one.
    pub async fn sweep(&self) -> Result<SweepResult, CacheError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Sweep(tx))?;
        rx.await.map_err(|_| CacheError::ExecutorShutdown)
    }

    /// Entry count and size of the directory as currently on disk.
    ///
    /// Staged changes are not included until they are flushed.
    pub async fn usage(&self) -> Result<DiskUsage, CacheError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Usage(tx))?;
        rx.await.map_err(|_| CacheError::ExecutorShutdown)
    }

    /// Stop the executor after a final flush and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.executor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Disk cache executor ended abnormally");
            }
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DiskStats {
        self.inner.stats.lock().clone()
    }

    /// Cache directory.
    pub fn directory(&self) -> &Path {
        &self.inner.config.directory
    }

    /// Configuration the cache was opened with.
    pub fn config(&self) -> &DiskCacheConfig {
        &self.inner.config
    }

    fn send(&self, command: Command) -> Result<(), CacheError> {
        self.commands
            .send(command)
            .map_err(|_| CacheError::ExecutorShutdown)
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("directory", &self.inner.config.directory)
            .finish_non_exhaustive()
    }
}

/// The single task that performs all filesystem mutation.
async fn run_executor(
    inner: Arc<DiskInner>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
) {
    let config = &inner.config;
    let mut flush_deadline: Option<Instant> = None;
    let mut sweep_timer = tokio::time::interval_at(
        Instant::now() + config.sweep_initial_delay,
        config.sweep_interval,
    );
    sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(directory = %config.directory.display(), "Disk cache executor started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                inner.flush_now().await;
                break;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    inner.flush_now().await;
                    break;
                };
                match command {
                    Command::ScheduleFlush => {
                        flush_deadline.get_or_insert_with(|| Instant::now() + config.flush_delay);
                    }
                    Command::Flush(ack) => {
                        flush_deadline = None;
                        inner.flush_now().await;
                        let _ = ack.send(());
                    }
                    Command::Sweep(ack) => {
                        let result = inner.sweep_now().await;
                        let _ = ack.send(result);
                    }
                    Command::Touch(path) => inner.touch(path).await,
                    Command::Usage(ack) => {
                        let directory = config.directory.clone();
                        let usage = tokio::task::spawn_blocking(move || scan_usage(&directory))
                            .await
                            .unwrap_or_default();
                        let _ = ack.send(usage);
                    }
                }
            }

            _ = tokio::time::sleep_until(flush_deadline.unwrap_or_else(Instant::now)),
                if flush_deadline.is_some() =>
            {
                flush_deadline = None;
                inner.flush_now().await;
            }

            _ = sweep_timer.tick() => {
                inner.sweep_now().await;
            }
        }
    }

    debug!("Disk cache executor stopped");
}

impl DiskInner {
    /// Apply staged batches until nothing is pending.
    async fn flush_now(self: &Arc<Self>) {
        loop {
            let batch = {
                let mut staging = self.staging.lock();
                match staging.begin_flush() {
                    Some(batch) => batch,
                    None => {
                        staging.flush_scheduled = false;
                        return;
                    }
                }
            };

            let directory = self.config.directory.clone();
            let applied = Arc::clone(&batch);
            let outcome = tokio::task::spawn_blocking(move || apply_batch(&directory, &applied))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Disk cache flush task failed");
                    BatchOutcome {
                        failures: batch.len() as u64,
                        ..Default::default()
                    }
                });

            {
                let mut stats = self.stats.lock();
                stats.flushes += 1;
                stats.writes += outcome.writes;
                stats.write_failures += outcome.failures;
            }
            debug!(
                writes = outcome.writes,
                removals = outcome.removals,
                failures = outcome.failures,
                cleared = batch.clear_all(),
                "Disk cache flush complete"
            );

            if !self.staging.lock().finish_flush() {
                return;
            }
        }
    }

    async fn sweep_now(self: &Arc<Self>) -> SweepResult {
        let directory = self.config.directory.clone();
        let size_limit = self.config.size_limit;
        let count_limit = self.config.count_limit;

        let result = tokio::task::spawn_blocking(move || {
            sweep_directory(&directory, size_limit, count_limit)
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Disk cache sweep task failed");
            SweepResult::default()
        });

        {
            let mut stats = self.stats.lock();
            stats.sweeps += 1;
            stats.evictions += result.files_deleted as u64;
        }
        if result.evicted() {
            info!(
                files_deleted = result.files_deleted,
                bytes_freed = result.bytes_freed,
                entries = result.after.entry_count,
                size_bytes = result.after.size_bytes,
                duration_ms = result.duration_ms,
                "Disk cache sweep complete"
            );
        }
        result
    }

    async fn touch(&self, path: PathBuf) {
        let result = tokio::task::spawn_blocking(move || {
            filetime::set_file_atime(&path, filetime::FileTime::now()).map_err(|e| (path, e))
        })
        .await;
        if let Ok(Err((path, e))) = result {
            debug!(path = %path.display(), error = %e, "Failed to refresh access time");
        }
    }
}

/// Write one batch to the directory. Blocking.
fn apply_batch(directory: &Path, batch: &StagedBatch) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    if batch.clear_all() {
        match std::fs::remove_dir_all(directory) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "Failed to clear disk cache");
                outcome.failures += 1;
            }
        }
    }
    if let Err(e) = std::fs::create_dir_all(directory) {
        warn!(directory = %directory.display(), error = %e, "Failed to create disk cache directory");
        outcome.failures += batch.len() as u64;
        return outcome;
    }

    for (key, change) in batch.changes() {
        let path = cache_path(directory, key);
        match change {
            StagedChange::Add(bytes) => match write_atomic(&path, bytes) {
                Ok(()) => outcome.writes += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Disk cache write failed");
                    outcome.failures += 1;
                }
            },
            StagedChange::Remove => match std::fs::remove_file(&path) {
                Ok(()) => outcome.removals += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Disk cache removal failed");
                    outcome.failures += 1;
                }
            },
        }
    }

    outcome
}

/// Write to a temporary file and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp = temp_path(path);
    if let Err(e) = std::fs::write(&temp, data) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }
    std::fs::rename(&temp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp);
    })
}
