//! thumbpipe CLI - Command-line interface
//!
//! Generates thumbnails through the coalescing pipeline and manages the
//! on-disk thumbnail cache.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::cache::CacheAction;
use commands::config::ConfigAction;
use commands::generate::GenerateArgs;
use commands::prefetch::PrefetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "thumbpipe")]
#[command(version = thumbpipe::VERSION)]
#[command(about = "Generate and cache image thumbnails", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.thumbpipe/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate thumbnails for image files
    Generate(GenerateArgs),

    /// Warm the caches for image files without writing any output
    Prefetch(PrefetchArgs),

    /// Manage the disk cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Generate(args) => commands::generate::run(config_path, args).await,
        Commands::Prefetch(args) => commands::prefetch::run(config_path, args).await,
        Commands::Cache { action } => commands::cache::run(config_path, action).await,
        Commands::Config { action } => commands::config::run(config_path, action),
    }
}
