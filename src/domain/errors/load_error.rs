//! Image loading error types.

use thiserror::Error;

/// Result type for image loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Image loading error variants.
///
/// Cloneable so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("network error loading {url}: {message}")]
    Network { url: String, message: String },

    #[error("failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    #[error("timed out loading {url}")]
    Timeout { url: String },

    #[error("runtime cannot decode {format}")]
    UnsupportedFormat { format: String },

    #[error("visibility observation is unavailable: {reason}")]
    ObserverUnavailable { reason: String },
}

impl LoadError {
    /// Creates network error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates timeout error.
    #[must_use]
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates observer unavailable error.
    #[must_use]
    pub fn observer_unavailable(reason: impl Into<String>) -> Self {
        Self::ObserverUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns whether the error came from fetching or decoding an image.
    #[must_use]
    pub const fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Decode { .. } | Self::Timeout { .. }
        )
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Returns whether the error must stay internal and never reach the UI.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::ObserverUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::network("https://cdn.example.com/a.jpg", "HTTP 404 Not Found");
        assert_eq!(
            err.to_string(),
            "network error loading https://cdn.example.com/a.jpg: HTTP 404 Not Found"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(LoadError::timeout("u").is_network_error());
        assert!(LoadError::decode("u", "bad header").is_load_failure());
        assert!(!LoadError::decode("u", "bad header").is_network_error());
        assert!(LoadError::unsupported_format("webp").is_internal());
        assert!(!LoadError::observer_unavailable("headless").is_load_failure());
    }
}
