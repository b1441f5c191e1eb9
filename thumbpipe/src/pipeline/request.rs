//! Thumbnail requests and the sources that supply original image bytes.

use crate::cache::CacheKey;
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Capability that produces the original encoded bytes of an image.
///
/// Failures are opaque: a source that cannot produce bytes returns `None`.
/// The identity must be stable for the same underlying image since it is
/// part of the cache key.
pub trait ImageSource: Send + Sync + 'static {
    /// Loads the original bytes.
    fn load(&self) -> BoxFuture<'_, Option<Vec<u8>>>;

    /// Stable identity of the image, used to derive cache keys.
    fn identity(&self) -> &str;
}

/// Image stored in a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    identity: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identity = format!("file://{}", path.display());
        Self { path, identity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn load(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            match tokio::fs::read(&self.path).await {
                Ok(data) => Some(data),
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "Failed to read source file");
                    None
                }
            }
        })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Image already held in memory, e.g. fetched by a network layer.
#[derive(Debug, Clone)]
pub struct BytesSource {
    identity: String,
    data: Arc<Vec<u8>>,
}

impl BytesSource {
    pub fn new(identity: impl Into<String>, data: impl Into<Arc<Vec<u8>>>) -> Self {
        Self {
            identity: identity.into(),
            data: data.into(),
        }
    }
}

impl ImageSource for BytesSource {
    fn load(&self) -> BoxFuture<'_, Option<Vec<u8>>> {
        let data = (*self.data).clone();
        Box::pin(async move { Some(data) })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Target size of a thumbnail in layout points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square target.
    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Longest edge in pixels the downsampled bitmap must cover.
    ///
    /// Computed from the larger of the two target dimensions times the
    /// scale factor, rounded up and never less than one pixel.
    pub fn max_dimension(&self, scale: f32) -> u32 {
        let longest = self.width.max(self.height) as f64;
        let scale = if scale.is_finite() && scale > 0.0 {
            scale as f64
        } else {
            1.0
        };
        ((longest * scale).ceil() as u32).max(1)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable request for one thumbnail.
#[derive(Clone)]
pub struct ThumbnailRequest {
    source: Arc<dyn ImageSource>,
    size: TargetSize,
    scale: f32,
    key: CacheKey,
    prefetch: bool,
}

impl ThumbnailRequest {
    /// Create a request; the cache key is derived from the source identity,
    /// target size and scale.
    pub fn new(source: Arc<dyn ImageSource>, size: TargetSize, scale: f32) -> Self {
        let key = CacheKey::derive(source.identity(), size.width, size.height, scale);
        Self {
            source,
            size,
            scale,
            key,
            prefetch: false,
        }
    }

    /// Mark the request as a prefetch: nobody is waiting on the bitmap.
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn source(&self) -> &Arc<dyn ImageSource> {
        &self.source
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_prefetch(&self) -> bool {
        self.prefetch
    }

    pub fn max_dimension(&self) -> u32 {
        self.size.max_dimension(self.scale)
    }
}

impl fmt::Debug for ThumbnailRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailRequest")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("scale", &self.scale)
            .field("prefetch", &self.prefetch)
            .finish()
    }
}
