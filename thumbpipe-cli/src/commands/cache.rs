//! Cache management CLI commands.

use clap::Subcommand;
use std::path::Path;
use std::time::Instant;
use thumbpipe::cache::{CacheStatistics, DiskCache};
use thumbpipe::config::format_size;

use super::common::{load_config, start_logging};
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show disk cache statistics
    Stats,
    /// Clear the disk cache, removing all cached thumbnails
    Clear,
    /// Evict least recently used thumbnails until the cache is within its limits
    Sweep,
}

/// Run a cache subcommand.
pub async fn run(config_path: Option<&Path>, action: CacheAction) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _logging = start_logging(&config)?;
    let parts = config.to_pipeline_parts();
    let started_at = Instant::now();
    let disk = DiskCache::open(parts.disk).await?;
    let cache_dir = disk.directory().to_path_buf();

    let outcome = match action {
        CacheAction::Stats => disk.usage().await.map(|usage| {
            // The memory tier lives only as long as a generating process.
            let stats = CacheStatistics::new(
                None,
                disk.stats(),
                usage.entry_count,
                usage.size_bytes,
                started_at,
            );
            println!("Disk cache: {}", cache_dir.display());
            println!();
            print!("{}", stats.format());
        }),
        CacheAction::Clear => {
            println!("Clearing disk cache at: {}", cache_dir.display());
            match disk.usage().await {
                Ok(before) => {
                    disk.remove_all();
                    disk.flush().await.map(|()| {
                        println!(
                            "Deleted {} files, freed {}",
                            before.entry_count,
                            format_size(before.size_bytes)
                        );
                    })
                }
                Err(e) => Err(e),
            }
        }
        CacheAction::Sweep => {
            println!("Sweeping disk cache at: {}", cache_dir.display());
            disk.sweep().await.map(|result| {
                if result.evicted() {
                    println!(
                        "Deleted {} files, freed {} ({} files, {} remaining)",
                        result.files_deleted,
                        format_size(result.bytes_freed),
                        result.after.entry_count,
                        format_size(result.after.size_bytes)
                    );
                } else {
                    println!(
                        "Within limits ({} files, {}); nothing to do",
                        result.before.entry_count,
                        format_size(result.before.size_bytes)
                    );
                }
            })
        }
    };

    disk.shutdown().await;
    outcome.map_err(CliError::from)
}
