//! thumbpipe - asynchronous thumbnail generation with a two-tier cache
//!
//! Requests for the same source and size are coalesced into one task,
//! which runs through bounded stage pools and is served from a memory
//! cache and a staged disk cache on later requests.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use thumbpipe::cache::{DiskCache, DiskCacheConfig, MemoryCache, MemoryCacheConfig};
//! use thumbpipe::pipeline::{FileSource, PipelineConfig, TargetSize, ThumbnailPipeline, ThumbnailRequest};
//!
//! let memory = Arc::new(MemoryCache::new(MemoryCacheConfig::default()));
//! let disk = Arc::new(DiskCache::open(DiskCacheConfig::new("/tmp/thumbs")).await?);
//! let pipeline = ThumbnailPipeline::new(PipelineConfig::default(), memory, disk);
//!
//! let source = Arc::new(FileSource::new("photo.jpg"));
//! let request = ThumbnailRequest::new(source, TargetSize::square(128), 2.0);
//! let bitmap = pipeline.thumbnail(request).await?;
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod pipeline;

pub use cache::{CacheKey, DiskCache, MemoryCache};
pub use pipeline::{ThumbnailError, ThumbnailPipeline, ThumbnailRequest};

/// Version of the library and CLI, taken from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
