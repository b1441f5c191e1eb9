//! INI serialization: `ConfigFile` → commented config.ini text.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Render a `ConfigFile` as the commented INI written to disk.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let cache = &config.cache;
    let pipeline = &config.pipeline;
    let logging = &config.logging;

    format!(
        r#"[cache]
; Directory holding one file per cached thumbnail
directory = {}
; Memory cache limits (encoded bytes and entry count)
memory_size = {}
memory_count = {}
; Disk cache limits; the sweep evicts least recently accessed files past either
disk_size = {}
disk_count = {}
; Batch window for staged disk writes
flush_delay_ms = {}
; Sweep schedule
sweep_initial_delay_secs = {}
sweep_interval_secs = {}

[pipeline]
; Concurrent operations per stage
load = {}
disk_io = {}
downsample = {}
encode = {}
decompress = {}
; JPEG quality for opaque thumbnails (0.0 - 1.0)
quality = {}

[logging]
directory = {}
file = {}
"#,
        path_to_string(&cache.directory),
        format_size(cache.memory_size),
        cache.memory_count,
        format_size(cache.disk_size),
        cache.disk_count,
        cache.flush_delay_ms,
        cache.sweep_initial_delay_secs,
        cache.sweep_interval_secs,
        pipeline.load,
        pipeline.disk_io,
        pipeline.downsample,
        pipeline.encode,
        pipeline.decompress,
        pipeline.quality,
        path_to_string(&logging.directory),
        logging.file,
    )
}

/// Write paths under the home directory with a `~/` prefix.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
