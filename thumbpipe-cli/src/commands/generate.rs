//! `thumbpipe generate` - produce thumbnails for image files.

use clap::Args;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thumbpipe::cache::{key_to_filename, CacheKey};
use thumbpipe::pipeline::{has_alpha, ThumbnailPipeline, ThumbnailRequest};
use tracing::{info, warn};

use super::common::{load_config, start_logging, PipelineRuntime, SizeArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Image files to thumbnail
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub size: SizeArgs,

    /// Directory to write encoded thumbnails into
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub async fn run(config_path: Option<&Path>, args: GenerateArgs) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _logging = start_logging(&config)?;

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out).map_err(|error| CliError::FileWrite {
            path: out.clone(),
            error,
        })?;
    }

    let runtime = PipelineRuntime::open(&config).await?;
    let requests = args.size.requests(&args.files);
    let total = requests.len();

    let out = args.out.as_deref();
    let stems = output_stems(
        &args
            .files
            .iter()
            .zip(&requests)
            .map(|(path, request)| (path.as_path(), request.key()))
            .collect::<Vec<_>>(),
    );
    let results = join_all(
        args.files
            .iter()
            .zip(requests)
            .zip(stems)
            .map(|((path, request), stem)| {
                generate_one(&runtime.pipeline, path, request, out.map(|dir| (dir, stem)))
            }),
    )
    .await;

    let stats = runtime.pipeline.coalescer_stats();
    info!(
        total = stats.total_requests,
        coalesced = stats.coalesced_requests,
        "Generation finished"
    );
    runtime.shutdown().await;

    let failed = results
        .into_iter()
        .filter_map(Result::err)
        .inspect(|e| eprintln!("{}", e))
        .count();
    if failed > 0 {
        return Err(CliError::Incomplete { failed, total });
    }
    Ok(())
}

async fn generate_one(
    pipeline: &ThumbnailPipeline,
    path: &Path,
    request: ThumbnailRequest,
    out: Option<(&Path, String)>,
) -> Result<(), CliError> {
    let key = request.key().clone();
    let bitmap = pipeline
        .thumbnail(request)
        .await
        .map_err(|error| CliError::Thumbnail {
            path: path.to_path_buf(),
            error,
        })?;

    let (width, height) = bitmap.dimensions();
    let Some((out, stem)) = out else {
        println!("{} -> {}x{}", path.display(), width, height);
        return Ok(());
    };

    let Some(encoded) = pipeline.cached(&key).await else {
        warn!(key = %key, "Thumbnail evicted before it could be written");
        println!("{} -> {}x{} (not written)", path.display(), width, height);
        return Ok(());
    };

    let target = output_path(out, &stem, has_alpha(&bitmap));
    std::fs::write(&target, encoded.as_slice()).map_err(|error| CliError::FileWrite {
        path: target.clone(),
        error,
    })?;
    println!(
        "{} -> {} ({}x{})",
        path.display(),
        target.display(),
        width,
        height
    );
    Ok(())
}

/// Hex digits of the key hash used to tell apart inputs with the same stem.
const SHORT_HASH_LEN: usize = 8;

/// Output file stem for each input.
///
/// Inputs from different directories can share a file stem; those get the
/// first characters of their cache key hash appended so their outputs stay
/// apart.
fn output_stems(inputs: &[(&Path, &CacheKey)]) -> Vec<String> {
    let stems: Vec<String> = inputs
        .iter()
        .map(|(path, _)| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "thumbnail".to_string())
        })
        .collect();

    let mut keys_per_stem: HashMap<&str, Vec<&CacheKey>> = HashMap::new();
    for (stem, (_, key)) in stems.iter().zip(inputs) {
        let keys = keys_per_stem.entry(stem.as_str()).or_default();
        if !keys.contains(key) {
            keys.push(key);
        }
    }

    stems
        .iter()
        .zip(inputs)
        .map(|(stem, (_, key))| {
            if keys_per_stem.get(stem.as_str()).map_or(0, Vec::len) > 1 {
                format!("{}-{}", stem, &key_to_filename(key)[..SHORT_HASH_LEN])
            } else {
                stem.clone()
            }
        })
        .collect()
}

/// `<out>/<stem>.png` for thumbnails with transparency, `.jpg` otherwise.
fn output_path(out: &Path, stem: &str, alpha: bool) -> PathBuf {
    let extension = if alpha { "png" } else { "jpg" };
    out.join(format!("{}.{}", stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_extension_follows_alpha() {
        let out = Path::new("/out");
        assert_eq!(
            output_path(out, "cat", false),
            PathBuf::from("/out/cat.jpg")
        );
        assert_eq!(
            output_path(out, "logo", true),
            PathBuf::from("/out/logo.png")
        );
    }

    #[test]
    fn test_output_stems_unique_names_unchanged() {
        let a = CacheKey::new("a");
        let b = CacheKey::new("b");
        let stems = output_stems(&[
            (Path::new("/in/cat.jpeg"), &a),
            (Path::new("/in/dog.png"), &b),
        ]);
        assert_eq!(stems, vec!["cat", "dog"]);
    }

    #[test]
    fn test_output_stems_disambiguate_shared_stem() {
        let a = CacheKey::new("/a/cat.jpg|w=64");
        let b = CacheKey::new("/b/cat.jpg|w=64");
        let stems = output_stems(&[
            (Path::new("/a/cat.jpg"), &a),
            (Path::new("/b/cat.jpg"), &b),
        ]);

        assert_ne!(stems[0], stems[1]);
        assert_eq!(stems[0], format!("cat-{}", &key_to_filename(&a)[..SHORT_HASH_LEN]));
        assert!(stems[1].starts_with("cat-"));
    }

    #[test]
    fn test_output_stems_same_input_twice_shares_name() {
        let a = CacheKey::new("a");
        let stems = output_stems(&[
            (Path::new("/in/cat.jpg"), &a),
            (Path::new("/in/cat.jpg"), &a),
        ]);
        assert_eq!(stems, vec!["cat", "cat"]);
    }
}
