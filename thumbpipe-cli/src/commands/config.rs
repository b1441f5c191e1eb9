//! Configuration management CLI commands.

use clap::Subcommand;
use std::path::Path;
use thumbpipe::config::{config_file_path, ConfigFile};

use super::common::load_config;
use crate::error::CliError;

/// Config action subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as INI
    Show,
    /// Write a default config file if none exists
    Init,
    /// Print the config file location
    Path,
}

/// Run a config subcommand.
pub fn run(config_path: Option<&Path>, action: ConfigAction) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(Some(&path))?;
            print!("{}", config.to_ini_string());
        }
        ConfigAction::Init => {
            if ConfigFile::init_at(&path)? {
                println!("Created {}", path.display());
            } else {
                println!("Config file already exists: {}", path.display());
            }
        }
        ConfigAction::Path => print_path(&path),
    }
    Ok(())
}

fn print_path(path: &Path) {
    let marker = if path.exists() { "" } else { " (not created yet)" };
    println!("{}{}", path.display(), marker);
}
