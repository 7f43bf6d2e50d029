//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::ImagingOptions;
use crate::application::services::{
    FormatConfig, StrategyConfig, TelemetryConfig, VisibilityConfig,
};
use crate::domain::entities::{BuildMode, PerformanceThresholds};
use crate::infrastructure::image::FetchConfig;

use super::args::CliArgs;

const APP_NAME: &str = "storefront-imaging";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "storefront";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Imaging configuration, read from `config.toml` and overridden from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagingConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Build flavour; diagnostics are only printed in development.
    #[serde(default)]
    pub build_mode: BuildMode,

    /// Load duration thresholds.
    #[serde(default)]
    pub thresholds: PerformanceThresholds,

    /// Lazy-loading visibility defaults.
    #[serde(default)]
    pub visibility: VisibilityConfig,

    /// Orchestrator timing.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// HTTP fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Telemetry retention.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// WebP rewriting.
    #[serde(default)]
    pub format: FormatConfig,
}

impl ImagingConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(build_mode) = args.build_mode {
            self.build_mode = build_mode;
        }
    }

    /// Settings for the imaging services.
    #[must_use]
    pub fn options(&self) -> ImagingOptions {
        ImagingOptions {
            build_mode: self.build_mode,
            thresholds: self.thresholds,
            telemetry: self.telemetry.clone(),
            visibility: self.visibility,
            strategy: self.strategy.clone(),
            format: self.format.clone(),
        }
    }

    /// Fetch settings, resolving relative URLs against the site origin by default.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        let mut fetch = self.fetch.clone();
        if fetch.base_url.is_none() {
            fetch.base_url.clone_from(&self.format.site_origin);
        }
        fetch
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("storefront-imaging.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
