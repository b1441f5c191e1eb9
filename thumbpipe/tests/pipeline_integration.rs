//! End-to-end tests for the thumbnail pipeline.
//!
//! A gated, counting source lets the tests hold a task inside its Load stage
//! while more callers join or cancel. The codec is deterministic and does no
//! real image work: "thumbnails" are encoded as `thumb:<w>x<h>`.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thumbpipe::cache::{
    cache_path, CacheKey, DiskCache, DiskCacheConfig, MemoryCache, MemoryCacheConfig,
};
use thumbpipe::pipeline::{
    Bitmap, ImageSource, PipelineConfig, Stage, StageEvent, StageRecorder, TargetSize,
    ThumbnailCodec, ThumbnailError, ThumbnailPipeline, ThumbnailRequest,
};
use tokio::sync::{oneshot, Semaphore};

// ============================================================================
// Test doubles
// ============================================================================

/// Source whose loads block until the gate is opened.
struct GatedSource {
    identity: String,
    data: Vec<u8>,
    gate: Semaphore,
    loads: AtomicUsize,
}

impl GatedSource {
    fn new(identity: &str, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
            data: data.to_vec(),
            gate: Semaphore::new(0),
            loads: AtomicUsize::new(0),
        })
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ImageSource for GatedSource {
    fn load(&self) -> futures::future::BoxFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.ok()?;
            Some(self.data.clone())
        })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Codec that fakes image work and counts every call.
#[derive(Default)]
struct MockCodec {
    downsamples: AtomicUsize,
    encodes: AtomicUsize,
    decodes: AtomicUsize,
}

impl MockCodec {
    const BAD_SOURCE: &'static [u8] = b"not an image";

    fn parse(bytes: &[u8]) -> Option<(u32, u32)> {
        let text = std::str::from_utf8(bytes).ok()?;
        let (w, h) = text.strip_prefix("thumb:")?.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }
}

impl ThumbnailCodec for MockCodec {
    fn decode(&self, bytes: &[u8]) -> Option<Bitmap> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let (w, h) = Self::parse(bytes)?;
        Some(Bitmap::new(w, h))
    }

    fn downsample(&self, bytes: &[u8], max_dimension: u32) -> Option<Bitmap> {
        self.downsamples.fetch_add(1, Ordering::SeqCst);
        if bytes == Self::BAD_SOURCE {
            return None;
        }
        Some(Bitmap::new(max_dimension, max_dimension / 2))
    }

    fn encode(&self, bitmap: &Bitmap, _quality: f32, _has_alpha: bool) -> Option<Vec<u8>> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        Some(format!("thumb:{}x{}", bitmap.width(), bitmap.height()).into_bytes())
    }
}

/// Codec whose calls for one stage block their worker thread until released.
struct HoldingCodec {
    inner: MockCodec,
    held: Stage,
    entered: AtomicUsize,
    returned: AtomicUsize,
    released: AtomicBool,
}

impl HoldingCodec {
    fn new(held: Stage) -> Arc<Self> {
        Arc::new(Self {
            inner: MockCodec::default(),
            held,
            entered: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn hold(&self, stage: Stage) {
        if stage != self.held {
            return;
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        while !self.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.returned.fetch_add(1, Ordering::SeqCst);
    }
}

impl ThumbnailCodec for HoldingCodec {
    fn decode(&self, bytes: &[u8]) -> Option<Bitmap> {
        self.hold(Stage::Decompress);
        self.inner.decode(bytes)
    }

    fn downsample(&self, bytes: &[u8], max_dimension: u32) -> Option<Bitmap> {
        self.hold(Stage::Downsample);
        self.inner.downsample(bytes, max_dimension)
    }

    fn encode(&self, bitmap: &Bitmap, quality: f32, has_alpha: bool) -> Option<Vec<u8>> {
        self.hold(Stage::Encode);
        self.inner.encode(bitmap, quality, has_alpha)
    }
}

struct Harness<C = MockCodec> {
    _dir: TempDir,
    pipeline: ThumbnailPipeline,
    recorder: Arc<StageRecorder>,
    codec: Arc<C>,
}

async fn open_disk(dir: &TempDir) -> Arc<DiskCache> {
    let config = DiskCacheConfig::new(dir.path())
        .with_flush_delay(Duration::from_millis(20))
        .with_sweep_schedule(Duration::from_secs(3600), Duration::from_secs(3600));
    Arc::new(DiskCache::open(config).await.unwrap())
}

async fn harness() -> Harness {
    harness_with(Arc::new(MockCodec::default())).await
}

async fn harness_with<C: ThumbnailCodec + 'static>(codec: Arc<C>) -> Harness<C> {
    let dir = TempDir::new().unwrap();
    let disk = open_disk(&dir).await;
    let recorder = Arc::new(StageRecorder::new());
    let pipeline = ThumbnailPipeline::builder(
        PipelineConfig::default(),
        Arc::new(MemoryCache::new(MemoryCacheConfig::default())),
        disk,
    )
    .codec(codec.clone())
    .observer(recorder.clone())
    .build();

    Harness {
        _dir: dir,
        pipeline,
        recorder,
        codec,
    }
}

fn request(source: &Arc<GatedSource>) -> ThumbnailRequest {
    let source: Arc<dyn ImageSource> = source.clone();
    ThumbnailRequest::new(source, TargetSize::new(40, 30), 2.0)
}

/// Poll `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Stage flow
// ============================================================================

#[tokio::test]
async fn test_miss_runs_every_stage_in_order() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    source.open();
    let req = request(&source);

    let bitmap = h.pipeline.thumbnail(req.clone()).await.unwrap();

    assert_eq!(bitmap.dimensions(), (80, 40));
    h.pipeline.drain().await;
    assert_eq!(h.recorder.count(Stage::CacheStore), 1);

    let delivered: Vec<Stage> = h
        .recorder
        .stages_for(req.key())
        .into_iter()
        .filter(|stage| *stage != Stage::CacheStore)
        .collect();
    assert_eq!(
        delivered,
        vec![
            Stage::CheckCache,
            Stage::Load,
            Stage::Downsample,
            Stage::Encode,
            Stage::Decompress,
        ]
    );
    assert!(h
        .recorder
        .events()
        .contains(&StageEvent::CacheChecked(req.key().clone(), false)));
}

#[tokio::test]
async fn test_completed_thumbnail_lands_in_both_tiers() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    source.open();
    let req = request(&source);

    h.pipeline.thumbnail(req.clone()).await.unwrap();

    let expected = b"thumb:80x40".to_vec();
    let memory = h.pipeline.memory_cache().get(req.key()).unwrap();
    assert_eq!(*memory, expected);

    let disk = h.pipeline.disk_cache().clone();
    h.pipeline.drain().await;
    assert_eq!(*disk.get(req.key()).await.unwrap(), expected);

    disk.flush().await.unwrap();
    let on_disk = std::fs::read(cache_path(disk.directory(), req.key())).unwrap();
    assert_eq!(on_disk, expected);
}

#[tokio::test]
async fn test_disk_hit_skips_generation() {
    let dir = TempDir::new().unwrap();
    let disk = open_disk(&dir).await;
    let source = GatedSource::new("photo", b"original");
    let req = request(&source);
    disk.store(req.key(), Some(Arc::new(b"thumb:12x6".to_vec())));

    let recorder = Arc::new(StageRecorder::new());
    let memory = Arc::new(MemoryCache::new(MemoryCacheConfig::default()));
    let pipeline = ThumbnailPipeline::builder(PipelineConfig::default(), memory.clone(), disk)
        .codec(Arc::new(MockCodec::default()))
        .observer(recorder.clone())
        .build();

    let bitmap = pipeline.thumbnail(req.clone()).await.unwrap();

    assert_eq!(bitmap.dimensions(), (12, 6));
    assert_eq!(source.loads(), 0);
    assert_eq!(
        recorder.stages_for(req.key()),
        vec![Stage::CheckCache, Stage::Decompress]
    );
    assert!(memory.contains(req.key()));
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_task() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    let req = request(&source);

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = h.pipeline.clone();
            let req = req.clone();
            tokio::spawn(async move { pipeline.thumbnail(req).await })
        })
        .collect();

    assert!(eventually(|| h.pipeline.coalescer_stats().total_requests == 8).await);
    assert!(eventually(|| source.loads() == 1).await);
    source.open();

    for result in join_all(callers).await {
        assert_eq!(result.unwrap().unwrap().dimensions(), (80, 40));
    }

    let stats = h.pipeline.coalescer_stats();
    assert_eq!(stats.new_requests, 1);
    assert_eq!(stats.coalesced_requests, 7);
    assert_eq!(source.loads(), 1);
    assert_eq!(h.codec.downsamples.load(Ordering::SeqCst), 1);
    assert_eq!(h.codec.encodes.load(Ordering::SeqCst), 1);
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.count(Stage::Load), 1);
    assert_eq!(h.pipeline.in_flight(), 0);
}

#[tokio::test]
async fn test_failure_reaches_every_subscriber() {
    let h = harness().await;
    let source = GatedSource::new("broken", MockCodec::BAD_SOURCE);
    let req = request(&source);

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = h.pipeline.clone();
            let req = req.clone();
            tokio::spawn(async move { pipeline.thumbnail(req).await })
        })
        .collect();

    assert!(eventually(|| h.pipeline.coalescer_stats().total_requests == 3).await);
    source.open();

    for result in join_all(callers).await {
        assert_eq!(result.unwrap(), Err(ThumbnailError::DownsampleFailure));
    }
    assert_eq!(h.codec.downsamples.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.count(Stage::Encode), 0);
    assert!(!h.pipeline.memory_cache().contains(req.key()));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelling_one_subscriber_leaves_the_other() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    let req = request(&source);

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let sub_a = h.pipeline.request(
        req.clone(),
        Box::new(move |result| {
            let _ = tx_a.send(result);
        }),
    );
    let _sub_b = h.pipeline.request(
        req.clone(),
        Box::new(move |result| {
            let _ = tx_b.send(result);
        }),
    );
    assert!(eventually(|| source.loads() == 1).await);

    assert!(sub_a.cancel());
    assert_eq!(rx_a.await.unwrap(), Err(ThumbnailError::Cancelled));

    source.open();
    let bitmap = rx_b.await.unwrap().unwrap();
    assert_eq!(bitmap.dimensions(), (80, 40));
    assert_eq!(source.loads(), 1);
}

#[tokio::test]
async fn test_cancelling_every_subscriber_stops_the_task() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    let req = request(&source);

    let subscriptions: Vec<_> = (0..2)
        .map(|_| h.pipeline.request(req.clone(), Box::new(|_| {})))
        .collect();
    assert!(eventually(|| source.loads() == 1).await);

    for subscription in &subscriptions {
        assert!(subscription.cancel());
    }
    assert_eq!(h.pipeline.in_flight(), 0);

    source.open();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.recorder.count(Stage::Downsample), 0);
    assert_eq!(h.recorder.count(Stage::CacheStore), 0);
    assert!(!h.pipeline.memory_cache().contains(req.key()));
    assert!(h.pipeline.disk_cache().get(req.key()).await.is_none());
}

/// Cancel every subscriber while the held codec stage runs, let the codec
/// call finish, and wait for the task to reach its next boundary.
async fn cancel_during(stage: Stage) -> (Harness<HoldingCodec>, ThumbnailRequest) {
    let h = harness_with(HoldingCodec::new(stage)).await;
    let source = GatedSource::new("photo", b"original");
    source.open();
    let req = request(&source);

    let subscriptions: Vec<_> = (0..2)
        .map(|_| h.pipeline.request(req.clone(), Box::new(|_| {})))
        .collect();
    assert!(eventually(|| h.codec.entered.load(Ordering::SeqCst) == 1).await);
    assert_eq!(h.pipeline.in_flight(), 1);

    for subscription in &subscriptions {
        assert!(subscription.cancel());
    }
    assert_eq!(h.pipeline.in_flight(), 0);

    // The codec call already running is not interrupted.
    h.codec.release();
    assert!(eventually(|| h.codec.returned.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.pipeline.drain().await;

    (h, req)
}

#[tokio::test]
async fn test_cancel_during_downsample_stops_before_encode() {
    let (h, req) = cancel_during(Stage::Downsample).await;

    assert_eq!(h.codec.inner.downsamples.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.count(Stage::Encode), 0);
    assert_eq!(h.codec.inner.encodes.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorder.count(Stage::CacheStore), 0);
    assert!(!h.pipeline.memory_cache().contains(req.key()));
    assert!(h.pipeline.disk_cache().get(req.key()).await.is_none());
    assert_eq!(h.pipeline.in_flight(), 0);

    let bitmap = h.pipeline.thumbnail(req.clone()).await.unwrap();
    assert_eq!(bitmap.dimensions(), (80, 40));
    assert_eq!(h.codec.inner.downsamples.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_during_encode_writes_nothing() {
    let (h, req) = cancel_during(Stage::Encode).await;

    assert_eq!(h.codec.inner.encodes.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.count(Stage::CacheStore), 0);
    assert_eq!(h.recorder.count(Stage::Decompress), 0);
    assert!(!h.pipeline.memory_cache().contains(req.key()));
    assert!(h.pipeline.disk_cache().get(req.key()).await.is_none());
    assert_eq!(h.pipeline.in_flight(), 0);

    let bitmap = h.pipeline.thumbnail(req.clone()).await.unwrap();
    assert_eq!(bitmap.dimensions(), (80, 40));
    assert_eq!(h.codec.inner.encodes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_future_cancels_only_its_caller() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    let req = request(&source);

    let waiting = {
        let pipeline = h.pipeline.clone();
        let req = req.clone();
        tokio::spawn(async move { pipeline.thumbnail(req).await })
    };
    let abandoned = {
        let pipeline = h.pipeline.clone();
        let req = req.clone();
        tokio::spawn(async move { pipeline.thumbnail(req).await })
    };
    assert!(eventually(|| h.pipeline.coalescer_stats().total_requests == 2).await);

    abandoned.abort();
    let _ = abandoned.await;
    source.open();

    assert!(waiting.await.unwrap().is_ok());
    assert_eq!(source.loads(), 1);
}

// ============================================================================
// Prefetch
// ============================================================================

#[tokio::test]
async fn test_prefetch_warms_caches_for_later_requests() {
    let h = harness().await;
    let source = GatedSource::new("photo", b"original");
    source.open();
    let req = request(&source);

    assert_eq!(h.pipeline.prefetch(vec![req.clone()]), 1);
    let memory = h.pipeline.memory_cache().clone();
    assert!(eventually(|| memory.contains(req.key())).await);

    h.pipeline.thumbnail(req.clone()).await.unwrap();

    assert_eq!(source.loads(), 1);
    assert_eq!(h.pipeline.prefetch(vec![req]), 0);
}

#[test]
fn test_keys_depend_on_size_and_scale() {
    let a = CacheKey::derive("photo", 40, 30, 2.0);
    assert_eq!(a, CacheKey::derive("photo", 40, 30, 2.0));
    assert_ne!(a, CacheKey::derive("photo", 40, 30, 1.0));
    assert_ne!(a, CacheKey::derive("photo", 30, 40, 2.0));
    assert_ne!(a, CacheKey::derive("other", 40, 30, 2.0));
}
