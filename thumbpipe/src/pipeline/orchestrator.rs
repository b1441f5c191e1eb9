//! Pipeline orchestrator: drives each task through its stages.
//!
//! # Flow
//!
//! ```text
//! CheckCache ──[hit]──────────────────────────────────────────► Decompress ──► deliver
//!     │                                                            ▲
//!     └─[miss]─► Load ─► Downsample ─► Encode ──┬──────────────────┘
//!                                               └─► CacheStore (detached)
//! ```
//!
//! Every stage acquires a permit from its own pool before running and gives
//! it back when done. Before each stage the task is checked for
//! cancellation; a cancelled task stops at that boundary. Codec calls that
//! already started run to completion and their result is discarded.
//!
//! Codec work runs on the blocking thread pool so the async workers stay
//! free for I/O.

use crate::cache::{CacheKey, DiskCache, EncodedBytes, MemoryCache};
use crate::pipeline::codec::{has_alpha, ImageCodec, ThumbnailCodec};
use crate::pipeline::concurrency_limiter::ConcurrencyPermit;
use crate::pipeline::error::{ThumbnailError, ThumbnailResult};
use crate::pipeline::request::ThumbnailRequest;
use crate::pipeline::stage::{Stage, StageConcurrency, StageObserver, StagePools};
use crate::pipeline::task_pool::{CoalescerStats, Completion, Subscription, TaskHandle, TaskPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, instrument, trace, warn};

/// Default lossy encode quality.
pub const DEFAULT_ENCODE_QUALITY: f32 = 0.8;

/// Runtime configuration of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Per-stage pool sizes
    pub concurrency: StageConcurrency,
    /// Lossy encode quality (0.0 to 1.0)
    pub encode_quality: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: StageConcurrency::default(),
            encode_quality: DEFAULT_ENCODE_QUALITY,
        }
    }
}

impl PipelineConfig {
    pub fn with_concurrency(mut self, concurrency: StageConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the encode quality, clamped to 0.0..=1.0.
    pub fn with_encode_quality(mut self, quality: f32) -> Self {
        self.encode_quality = quality.clamp(0.0, 1.0);
        self
    }
}

struct PipelineInner {
    tasks: Arc<TaskPool>,
    pools: StagePools,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    codec: Arc<dyn ThumbnailCodec>,
    observer: Option<Arc<dyn StageObserver>>,
    config: PipelineConfig,
    pending_stores: AtomicUsize,
    stores_done: Notify,
}

/// Builder for [`ThumbnailPipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    codec: Arc<dyn ThumbnailCodec>,
    observer: Option<Arc<dyn StageObserver>>,
}

impl PipelineBuilder {
    /// Replace the default [`ImageCodec`].
    pub fn codec(mut self, codec: Arc<dyn ThumbnailCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Report stage transitions to an observer.
    pub fn observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> ThumbnailPipeline {
        ThumbnailPipeline {
            inner: Arc::new(PipelineInner {
                tasks: Arc::new(TaskPool::new()),
                pools: StagePools::new(&self.config.concurrency),
                memory: self.memory,
                disk: self.disk,
                codec: self.codec,
                observer: self.observer,
                config: self.config,
                pending_stores: AtomicUsize::new(0),
                stores_done: Notify::new(),
            }),
        }
    }
}

/// Asynchronous thumbnail pipeline over a memory and a disk cache.
///
/// Cloning is cheap; clones share caches, pools and in-flight tasks. Must
/// be used inside a Tokio runtime.
#[derive(Clone)]
pub struct ThumbnailPipeline {
    inner: Arc<PipelineInner>,
}

impl ThumbnailPipeline {
    /// Pipeline with the default codec and no observer.
    pub fn new(config: PipelineConfig, memory: Arc<MemoryCache>, disk: Arc<DiskCache>) -> Self {
        Self::builder(config, memory, disk).build()
    }

    pub fn builder(
        config: PipelineConfig,
        memory: Arc<MemoryCache>,
        disk: Arc<DiskCache>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            config,
            memory,
            disk,
            codec: Arc::new(ImageCodec::new()),
            observer: None,
        }
    }

    /// Subscribe to the thumbnail for `request`.
    ///
    /// Joins the in-flight task for the request's key or starts a new one.
    /// `completion` is called exactly once: with the bitmap, with the
    /// failure shared by all subscribers, or with
    /// [`ThumbnailError::Cancelled`] if the returned subscription is
    /// cancelled first.
    pub fn request(&self, request: ThumbnailRequest, completion: Completion) -> Subscription {
        let (task, subscription) = self.inner.tasks.join(request.key(), completion);
        if task.is_new() {
            trace!(
                key = %request.key(),
                prefetch = request.is_prefetch(),
                "Starting pipeline task"
            );
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run(request, task).await });
        }
        subscription
    }

    /// Produce the thumbnail for `request`.
    ///
    /// Dropping the returned future cancels this caller's subscription only.
    pub async fn thumbnail(&self, request: ThumbnailRequest) -> ThumbnailResult {
        let (tx, rx) = oneshot::channel();
        let subscription = self.request(
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let _guard = CancelOnDrop(subscription);
        rx.await.unwrap_or(Err(ThumbnailError::Cancelled))
    }

    /// Warm both caches for requests not already in the memory cache.
    ///
    /// Subscriptions are detached: nobody waits on the results. Returns the
    /// number of requests scheduled.
    pub fn prefetch(&self, requests: impl IntoIterator<Item = ThumbnailRequest>) -> usize {
        let mut scheduled = 0;
        for request in requests {
            if self.inner.memory.contains(request.key()) {
                trace!(key = %request.key(), "Prefetch skipped, already cached");
                continue;
            }
            let _detached = self.request(request.with_prefetch(true), Box::new(|_| {}));
            scheduled += 1;
        }
        debug!(scheduled, "Prefetch scheduled");
        scheduled
    }

    /// Encoded bytes for `key` from either cache tier, without generating.
    pub async fn cached(&self, key: &CacheKey) -> Option<EncodedBytes> {
        match self.inner.memory.get(key) {
            Some(bytes) => Some(bytes),
            None => self.inner.disk.get(key).await,
        }
    }

    /// Wait until every CacheStore started so far has handed its bytes to
    /// both tiers. Call before shutting down the disk cache.
    pub async fn drain(&self) {
        loop {
            let done = self.inner.stores_done.notified();
            if self.inner.pending_stores.load(Ordering::Acquire) == 0 {
                return;
            }
            done.await;
        }
    }

    pub fn memory_cache(&self) -> &Arc<MemoryCache> {
        &self.inner.memory
    }

    pub fn disk_cache(&self) -> &Arc<DiskCache> {
        &self.inner.disk
    }

    /// Coalescing counters of the task pool.
    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.inner.tasks.stats()
    }

    /// Number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.in_flight_count()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ThumbnailPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailPipeline")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Marks one detached CacheStore as finished when dropped.
struct PendingStore<'a>(&'a PipelineInner);

impl Drop for PendingStore<'_> {
    fn drop(&mut self) {
        if self.0.pending_stores.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.stores_done.notify_waiters();
        }
    }
}

/// Cancels a subscription when dropped. A no-op once the result is in.
struct CancelOnDrop(Subscription);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl PipelineInner {
    async fn run(self: Arc<Self>, request: ThumbnailRequest, task: TaskHandle) {
        let outcome = self.drive(&request, &task).await;
        if task.is_cancelled() {
            trace!(key = %task.key(), "Task stopped after cancellation");
            return;
        }
        self.tasks.complete(&task, outcome);
    }

    #[instrument(skip(self, request, task), fields(key = %task.key()))]
    async fn drive(
        self: &Arc<Self>,
        request: &ThumbnailRequest,
        task: &TaskHandle,
    ) -> ThumbnailResult {
        let key = task.key();

        let cached = {
            let _permit = self.enter(task, Stage::CheckCache).await?;
            match self.memory.get(key) {
                Some(bytes) => Some(bytes),
                None => self.disk.get(key).await,
            }
        };
        if let Some(observer) = &self.observer {
            observer.cache_checked(key, cached.is_some());
        }
        debug!(hit = cached.is_some(), "Cache check");

        let encoded = match cached {
            Some(bytes) => bytes,
            None => self.generate(request, task).await?,
        };

        let bitmap = {
            let _permit = self.enter(task, Stage::Decompress).await?;
            let bytes = Arc::clone(&encoded);
            self.run_codec(move |codec| codec.decode(&bytes)).await
        };
        let bitmap = bitmap.ok_or(ThumbnailError::DecodeFailure)?;

        if task.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }
        self.memory.set(key, Some(encoded));
        Ok(Arc::new(bitmap))
    }

    /// Load, downsample and encode; then hand the bytes to CacheStore.
    async fn generate(
        self: &Arc<Self>,
        request: &ThumbnailRequest,
        task: &TaskHandle,
    ) -> Result<EncodedBytes, ThumbnailError> {
        let original = {
            let _permit = self.enter(task, Stage::Load).await?;
            tokio::select! {
                biased;
                _ = task.cancellation_token().cancelled() => return Err(ThumbnailError::Cancelled),
                bytes = request.source().load() => bytes,
            }
        };
        let original = original
            .filter(|bytes| !bytes.is_empty())
            .ok_or(ThumbnailError::SourceUnavailable)?;
        trace!(size_bytes = original.len(), "Source loaded");

        let bitmap = {
            let _permit = self.enter(task, Stage::Downsample).await?;
            let max_dimension = request.max_dimension();
            self.run_codec(move |codec| codec.downsample(&original, max_dimension))
                .await
        };
        let bitmap = bitmap.ok_or(ThumbnailError::DownsampleFailure)?;

        let encoded = {
            let _permit = self.enter(task, Stage::Encode).await?;
            let quality = self.config.encode_quality;
            self.run_codec(move |codec| codec.encode(&bitmap, quality, has_alpha(&bitmap)))
                .await
        };
        let encoded: EncodedBytes = Arc::new(encoded.ok_or(ThumbnailError::EncodeFailure)?);

        self.spawn_store(task.clone(), Arc::clone(&encoded));
        Ok(encoded)
    }

    /// CacheStore: write the encoded bytes into both tiers without holding
    /// up delivery.
    fn spawn_store(self: &Arc<Self>, task: TaskHandle, encoded: EncodedBytes) {
        self.pending_stores.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _pending = PendingStore(&inner);
            if task.is_cancelled() {
                return;
            }
            if let Some(observer) = &inner.observer {
                observer.stage_started(task.key(), Stage::CacheStore);
            }
            let limiter = inner.pools.for_stage(Stage::CacheStore);
            let Some(_permit) = limiter.acquire().await else {
                return;
            };
            if task.is_cancelled() {
                return;
            }
            inner.memory.set(task.key(), Some(Arc::clone(&encoded)));
            inner.disk.store(task.key(), Some(encoded));
            trace!(key = %task.key(), "Stored in caches");
        });
    }

    /// Check for cancellation, record the stage and wait for its permit.
    async fn enter(
        &self,
        task: &TaskHandle,
        stage: Stage,
    ) -> Result<ConcurrencyPermit<'_>, ThumbnailError> {
        if !self.tasks.set_stage(task, stage) {
            return Err(ThumbnailError::Cancelled);
        }
        if let Some(observer) = &self.observer {
            observer.stage_started(task.key(), stage);
        }
        trace!(key = %task.key(), stage = %stage, "Entering stage");

        let limiter = self.pools.for_stage(stage);
        tokio::select! {
            biased;
            _ = task.cancellation_token().cancelled() => Err(ThumbnailError::Cancelled),
            permit = limiter.acquire() => permit.ok_or(ThumbnailError::Cancelled),
        }
    }

    async fn run_codec<T, F>(&self, work: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ThumbnailCodec) -> Option<T> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        match tokio::task::spawn_blocking(move || work(codec.as_ref())).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Codec task failed");
                None
            }
        }
    }
}
