//! Infrastructure layer with host adapters and configuration.

/// Application configuration.
pub mod config;
/// Document-head hint registry.
pub mod hints;
/// Image fetching and format probing.
pub mod image;
/// Simulated page viewport.
pub mod viewport;

pub use config::{CliArgs, ConfigError, ImagingConfig, LogLevel, PageManifest, StorageManager};
pub use hints::HeadHintRegistry;
pub use image::{DecodeProbe, FetchConfig, HttpImageFetcher};
pub use viewport::ScrollViewport;
