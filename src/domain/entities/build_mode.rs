use serde::{Deserialize, Serialize};

/// Build flavour; diagnostics are only emitted in development.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Local development, console diagnostics on.
    #[default]
    Development,
    /// Production, console diagnostics off.
    Production,
}

impl BuildMode {
    /// Returns true if diagnostics should be logged.
    #[must_use]
    pub const fn diagnostics_enabled(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}
