//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`generate`] - Generate thumbnails and write them out
//! - [`prefetch`] - Warm the caches
//! - [`cache`] - Cache management (stats, clear, sweep)
//! - [`config`] - Configuration management (show, init, path)

pub mod cache;
pub mod common;
pub mod config;
pub mod generate;
pub mod prefetch;
