//! Application configuration.

pub mod app_config;
pub mod args;
pub mod manifest;
pub mod storage;

pub use app_config::{ImagingConfig, LogLevel};
pub use args::CliArgs;
pub use manifest::{PageManifest, ViewportSize};
pub use storage::{ConfigError, StorageManager};
