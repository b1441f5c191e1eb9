//! Configuration file handling for ~/.thumbpipe/config.ini.
//!
//! Loads and saves user configuration with defaults for anything missing,
//! and converts it into the runtime config structs.

use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::config_file_path;
use super::settings::ConfigFile;
use crate::cache::{DiskCacheConfig, MemoryCacheConfig};
use crate::pipeline::{PipelineConfig, StageConcurrency};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// Runtime configuration derived from a [`ConfigFile`].
#[derive(Debug, Clone)]
pub struct PipelineParts {
    pub memory: MemoryCacheConfig,
    pub disk: DiskCacheConfig,
    pub pipeline: PipelineConfig,
}

impl ConfigFile {
    /// Load configuration from the default path (~/.thumbpipe/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Write a default config file at `path` unless one exists.
    ///
    /// Returns true if a file was created.
    pub fn init_at(path: &Path) -> Result<bool, ConfigFileError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Rendered INI text, as `save_to` would write it.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Split into the memory cache, disk cache and pipeline configs.
    pub fn to_pipeline_parts(&self) -> PipelineParts {
        let cache = &self.cache;
        let pipeline = &self.pipeline;

        let memory = MemoryCacheConfig::default()
            .with_cost_limit(usize::try_from(cache.memory_size).unwrap_or(usize::MAX))
            .with_count_limit(cache.memory_count);

        let disk = DiskCacheConfig::new(cache.directory.clone())
            .with_size_limit(cache.disk_size)
            .with_count_limit(cache.disk_count)
            .with_flush_delay(Duration::from_millis(cache.flush_delay_ms))
            .with_sweep_schedule(
                Duration::from_secs(cache.sweep_initial_delay_secs),
                Duration::from_secs(cache.sweep_interval_secs),
            );

        let concurrency = StageConcurrency::default()
            .with_load(pipeline.load)
            .with_disk_io(pipeline.disk_io)
            .with_downsample(pipeline.downsample)
            .with_encode(pipeline.encode)
            .with_decompress(pipeline.decompress);

        PipelineParts {
            memory,
            disk,
            pipeline: PipelineConfig::default()
                .with_concurrency(concurrency)
                .with_encode_quality(pipeline.quality),
        }
    }

    /// Full path of the log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.logging.directory.join(&self.logging.file)
    }
}
