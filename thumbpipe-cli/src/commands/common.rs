//! Common types and utilities shared across CLI commands.

use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thumbpipe::cache::{DiskCache, MemoryCache};
use thumbpipe::config::ConfigFile;
use thumbpipe::logging::{init_logging, LoggingGuard};
use thumbpipe::pipeline::{
    FileSource, ImageSource, TargetSize, ThumbnailPipeline, ThumbnailRequest,
};

use crate::error::CliError;

/// Thumbnail size arguments shared by `generate` and `prefetch`.
#[derive(Debug, Clone, Args)]
pub struct SizeArgs {
    /// Target width in points
    #[arg(long, default_value = "128")]
    pub width: u32,

    /// Target height in points
    #[arg(long, default_value = "128")]
    pub height: u32,

    /// Display scale (pixels per point)
    #[arg(long, default_value = "1.0")]
    pub scale: f32,
}

impl SizeArgs {
    /// One request per input file.
    pub fn requests(&self, files: &[PathBuf]) -> Vec<ThumbnailRequest> {
        let size = TargetSize::new(self.width, self.height);
        files
            .iter()
            .map(|path| {
                let source: Arc<dyn ImageSource> = Arc::new(FileSource::new(path));
                ThumbnailRequest::new(source, size, self.scale)
            })
            .collect()
    }
}

/// Load the config file given with `--config`, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Start logging to the configured log file.
pub fn start_logging(config: &ConfigFile) -> Result<LoggingGuard, CliError> {
    init_logging(&config.logging.directory, &config.logging.file).map_err(CliError::LoggingInit)
}

/// Caches and pipeline built from the configuration.
pub struct PipelineRuntime {
    pub pipeline: ThumbnailPipeline,
    pub disk: Arc<DiskCache>,
}

impl PipelineRuntime {
    pub async fn open(config: &ConfigFile) -> Result<Self, CliError> {
        let parts = config.to_pipeline_parts();
        let disk = Arc::new(DiskCache::open(parts.disk).await?);
        let memory = Arc::new(MemoryCache::new(parts.memory));
        let pipeline = ThumbnailPipeline::new(parts.pipeline, memory, Arc::clone(&disk));
        Ok(Self { pipeline, disk })
    }

    /// Wait for pending cache writes, flush them and stop the disk executor.
    pub async fn shutdown(self) {
        self.pipeline.drain().await;
        drop(self.pipeline);
        self.disk.shutdown().await;
    }
}
