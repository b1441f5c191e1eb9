//! Asynchronous thumbnail pipeline.
//!
//! A [`ThumbnailPipeline`] takes [`ThumbnailRequest`]s, coalesces requests
//! for the same cache key into one [`TaskPool`] task, and drives each task
//! through bounded stage pools:
//!
//! ```text
//! CheckCache → Load → Downsample → Encode → { CacheStore, Decompress }
//! ```
//!
//! The outcome is fanned out to every subscriber of the task.

mod codec;
mod concurrency_limiter;
mod error;
mod orchestrator;
mod request;
mod stage;
mod task_pool;

pub use codec::{has_alpha, Bitmap, ImageCodec, ThumbnailCodec};
pub use concurrency_limiter::{ConcurrencyLimiter, ConcurrencyPermit};
pub use error::{ThumbnailError, ThumbnailResult};
pub use orchestrator::{
    PipelineBuilder, PipelineConfig, ThumbnailPipeline, DEFAULT_ENCODE_QUALITY,
};
pub use request::{BytesSource, FileSource, ImageSource, TargetSize, ThumbnailRequest};
pub use stage::{
    Stage, StageConcurrency, StageEvent, StageObserver, StagePools, StageRecorder,
    DEFAULT_DECOMPRESS_CONCURRENCY, DEFAULT_DISK_IO_CONCURRENCY, DEFAULT_DOWNSAMPLE_CONCURRENCY,
    DEFAULT_ENCODE_CONCURRENCY, DEFAULT_LOAD_CONCURRENCY,
};
pub use task_pool::{CoalescerStats, Completion, Subscription, TaskHandle, TaskId, TaskPool};
