//! `thumbpipe prefetch` - warm the caches without writing output.

use clap::Args;
use futures::future::join_all;
use std::path::{Path, PathBuf};

use super::common::{load_config, start_logging, PipelineRuntime, SizeArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct PrefetchArgs {
    /// Image files to prefetch
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub size: SizeArgs,
}

pub async fn run(config_path: Option<&Path>, args: PrefetchArgs) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _logging = start_logging(&config)?;
    let runtime = PipelineRuntime::open(&config).await?;

    let requests = args.size.requests(&args.files);
    let total = requests.len();

    // Awaited rather than detached: the process exits when this returns.
    let pipeline = &runtime.pipeline;
    let results = join_all(
        requests
            .into_iter()
            .map(|request| pipeline.thumbnail(request.with_prefetch(true))),
    )
    .await;

    let mut failed = 0;
    for (path, result) in args.files.iter().zip(results) {
        if let Err(error) = result {
            eprintln!("{}: {}", path.display(), error);
            failed += 1;
        }
    }

    runtime.shutdown().await;
    println!("Prefetched {} of {} thumbnails", total - failed, total);

    if failed > 0 {
        return Err(CliError::Incomplete { failed, total });
    }
    Ok(())
}
