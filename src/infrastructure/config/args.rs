use super::app_config::LogLevel;
use crate::domain::entities::BuildMode;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "storefront-imaging",
    version,
    about = "Loads a storefront page's images by priority and reports how it went",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Build flavour.
    #[arg(long, value_enum, env = "STOREFRONT_BUILD_MODE")]
    pub build_mode: Option<BuildMode>,

    /// Page manifest listing the images by priority class.
    #[arg(short, long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Pixels scrolled per step when simulating the visitor; defaults to the viewport height.
    #[arg(long, value_name = "PX")]
    pub scroll_step: Option<f64>,
}
