//! Pipeline stages, their bounded pools, and the stage observer hook.

use crate::cache::CacheKey;
use crate::pipeline::concurrency_limiter::ConcurrencyLimiter;
use parking_lot::Mutex;
use std::fmt;

/// One phase of a thumbnail task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Look up the key in the caches
    CheckCache,
    /// Obtain original bytes from the source
    Load,
    /// Decode and resize the original
    Downsample,
    /// Re-encode the downsampled bitmap
    Encode,
    /// Write encoded bytes into both caches
    CacheStore,
    /// Decode encoded bytes for delivery
    Decompress,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckCache => "check_cache",
            Self::Load => "load",
            Self::Downsample => "downsample",
            Self::Encode => "encode",
            Self::CacheStore => "cache_store",
            Self::Decompress => "decompress",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default load concurrency.
pub const DEFAULT_LOAD_CONCURRENCY: usize = 1;
/// Default disk I/O concurrency (cache check and store).
pub const DEFAULT_DISK_IO_CONCURRENCY: usize = 2;
/// Default downsample concurrency.
pub const DEFAULT_DOWNSAMPLE_CONCURRENCY: usize = 2;
/// Default encode concurrency.
pub const DEFAULT_ENCODE_CONCURRENCY: usize = 1;
/// Default decompress concurrency.
pub const DEFAULT_DECOMPRESS_CONCURRENCY: usize = 1;

/// Per-stage concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConcurrency {
    pub load: usize,
    pub disk_io: usize,
    pub downsample: usize,
    pub encode: usize,
    pub decompress: usize,
}

impl Default for StageConcurrency {
    fn default() -> Self {
        Self {
            load: DEFAULT_LOAD_CONCURRENCY,
            disk_io: DEFAULT_DISK_IO_CONCURRENCY,
            downsample: DEFAULT_DOWNSAMPLE_CONCURRENCY,
            encode: DEFAULT_ENCODE_CONCURRENCY,
            decompress: DEFAULT_DECOMPRESS_CONCURRENCY,
        }
    }
}

impl StageConcurrency {
    pub fn with_load(mut self, n: usize) -> Self {
        self.load = n;
        self
    }

    pub fn with_disk_io(mut self, n: usize) -> Self {
        self.disk_io = n;
        self
    }

    pub fn with_downsample(mut self, n: usize) -> Self {
        self.downsample = n;
        self
    }

    pub fn with_encode(mut self, n: usize) -> Self {
        self.encode = n;
        self
    }

    pub fn with_decompress(mut self, n: usize) -> Self {
        self.decompress = n;
        self
    }
}

/// One limiter per resource type.
///
/// CheckCache and CacheStore share the disk I/O pool.
#[derive(Debug)]
pub struct StagePools {
    disk_io: ConcurrencyLimiter,
    load: ConcurrencyLimiter,
    downsample: ConcurrencyLimiter,
    encode: ConcurrencyLimiter,
    decompress: ConcurrencyLimiter,
}

impl StagePools {
    pub fn new(concurrency: &StageConcurrency) -> Self {
        Self {
            disk_io: ConcurrencyLimiter::new(concurrency.disk_io, "disk_io"),
            load: ConcurrencyLimiter::new(concurrency.load, "load"),
            downsample: ConcurrencyLimiter::new(concurrency.downsample, "downsample"),
            encode: ConcurrencyLimiter::new(concurrency.encode, "encode"),
            decompress: ConcurrencyLimiter::new(concurrency.decompress, "decompress"),
        }
    }

    /// The pool a stage runs on.
    pub fn for_stage(&self, stage: Stage) -> &ConcurrencyLimiter {
        match stage {
            Stage::CheckCache | Stage::CacheStore => &self.disk_io,
            Stage::Load => &self.load,
            Stage::Downsample => &self.downsample,
            Stage::Encode => &self.encode,
            Stage::Decompress => &self.decompress,
        }
    }
}

/// Receives stage transitions of every task.
///
/// Called from pipeline tasks; implementations must be cheap and must not
/// block.
pub trait StageObserver: Send + Sync {
    /// A task is about to run `stage` for `key`.
    fn stage_started(&self, key: &CacheKey, stage: Stage);

    /// The cache check for `key` finished.
    fn cache_checked(&self, _key: &CacheKey, _hit: bool) {}
}

/// An event seen by [`StageRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started(CacheKey, Stage),
    CacheChecked(CacheKey, bool),
}

/// Observer that records every event in order.
#[derive(Debug, Default)]
pub struct StageRecorder {
    events: Mutex<Vec<StageEvent>>,
}

impl StageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }

    /// Stages started for one key, in order.
    pub fn stages_for(&self, key: &CacheKey) -> Vec<Stage> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                StageEvent::Started(k, stage) if k == key => Some(*stage),
                _ => None,
            })
            .collect()
    }

    /// Number of times `stage` started, across all keys.
    pub fn count(&self, stage: Stage) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, StageEvent::Started(_, s) if *s == stage))
            .count()
    }
}

impl StageObserver for StageRecorder {
    fn stage_started(&self, key: &CacheKey, stage: Stage) {
        self.events
            .lock()
            .push(StageEvent::Started(key.clone(), stage));
    }

    fn cache_checked(&self, key: &CacheKey, hit: bool) {
        self.events
            .lock()
            .push(StageEvent::CacheChecked(key.clone(), hit));
    }
}
