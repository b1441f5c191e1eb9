//! INI parsing: `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names map to struct fields.
//! Missing sections and keys keep their defaults.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::MAX_STAGE_CONCURRENCY;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parse an `Ini` object into a `ConfigFile`, starting from defaults.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("cache")) {
        let cache = &mut config.cache;
        let reader = SectionReader::new("cache", section);

        if let Some(v) = reader.non_empty("directory") {
            cache.directory = expand_tilde(v);
        }
        if let Some(v) = reader.size("memory_size")? {
            cache.memory_size = v;
        }
        if let Some(v) = reader.number("memory_count", "must be a whole number")? {
            cache.memory_count = v;
        }
        if let Some(v) = reader.size("disk_size")? {
            cache.disk_size = v;
        }
        if let Some(v) = reader.number("disk_count", "must be a whole number")? {
            cache.disk_count = v;
        }
        if let Some(v) = reader.number("flush_delay_ms", "must be a whole number (milliseconds)")? {
            cache.flush_delay_ms = v;
        }
        if let Some(v) =
            reader.number("sweep_initial_delay_secs", "must be a whole number (seconds)")?
        {
            cache.sweep_initial_delay_secs = v;
        }
        if let Some(v) = reader.number("sweep_interval_secs", "must be a positive number (seconds)")? {
            if v == 0 {
                return Err(reader.invalid("sweep_interval_secs", "0", "must be greater than zero"));
            }
            cache.sweep_interval_secs = v;
        }
    }

    if let Some(section) = ini.section(Some("pipeline")) {
        let pipeline = &mut config.pipeline;
        let reader = SectionReader::new("pipeline", section);

        for (key, slot) in [
            ("load", &mut pipeline.load),
            ("disk_io", &mut pipeline.disk_io),
            ("downsample", &mut pipeline.downsample),
            ("encode", &mut pipeline.encode),
            ("decompress", &mut pipeline.decompress),
        ] {
            if let Some(v) = reader.concurrency(key)? {
                *slot = v;
            }
        }
        if let Some(v) = reader.number::<f32>("quality", "must be a number between 0.0 and 1.0")? {
            if !(0.0..=1.0).contains(&v) {
                return Err(reader.invalid(
                    "quality",
                    &v.to_string(),
                    "must be a number between 0.0 and 1.0",
                ));
            }
            pipeline.quality = v;
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        let reader = SectionReader::new("logging", section);
        if let Some(v) = reader.non_empty("directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = reader.non_empty("file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

/// Typed access to one INI section with uniform error reporting.
struct SectionReader<'a> {
    name: &'static str,
    section: &'a Properties,
}

impl<'a> SectionReader<'a> {
    fn new(name: &'static str, section: &'a Properties) -> Self {
        Self { name, section }
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn non_empty(&self, key: &str) -> Option<&'a str> {
        self.section
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn number<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        self.non_empty(key)
            .map(|v| v.parse().map_err(|_| self.invalid(key, v, reason)))
            .transpose()
    }

    fn size(&self, key: &str) -> Result<Option<u64>, ConfigFileError> {
        self.non_empty(key)
            .map(|v| {
                parse_size(v).map_err(|_| {
                    self.invalid(key, v, "expected format like '64MB', '2GB', or '1024KB'")
                })
            })
            .transpose()
    }

    fn concurrency(&self, key: &str) -> Result<Option<usize>, ConfigFileError> {
        let reason = format!("must be between 1 and {}", MAX_STAGE_CONCURRENCY);
        match self.number::<usize>(key, &reason)? {
            Some(v) if v == 0 || v > MAX_STAGE_CONCURRENCY => {
                Err(self.invalid(key, &v.to_string(), &reason))
            }
            other => Ok(other),
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
